use crate::{collapse_whitespace, CapabilityExecutor, InvocationRequest};

/// A local fast-path handler. Receives the clean query, returns speakable text.
pub(crate) trait TriggerHandler: Send + Sync {
    fn handle(&self, clean_query: &str, executor: &CapabilityExecutor) -> String;
}

/// Adapter so plain closures can sit in the table next to built-in commands.
#[cfg(test)]
pub(crate) struct FnHandler<F>(pub(crate) F);

#[cfg(test)]
impl<F> TriggerHandler for FnHandler<F>
where
    F: Fn(&str, &CapabilityExecutor) -> String + Send + Sync,
{
    fn handle(&self, clean_query: &str, executor: &CapabilityExecutor) -> String {
        (self.0)(clean_query, executor)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum LocalCommand {
    /// Residual text (query minus `strip` words) becomes `parameter`.
    Search {
        capability: &'static str,
        parameter: &'static str,
        strip: &'static [&'static str],
        missing: &'static str,
    },
    /// Fixed invocation; the query text is ignored.
    Invoke {
        capability: &'static str,
        args: &'static [(&'static str, &'static str)],
    },
}

impl TriggerHandler for LocalCommand {
    fn handle(&self, clean_query: &str, executor: &CapabilityExecutor) -> String {
        match self {
            LocalCommand::Search {
                capability,
                parameter,
                strip,
                missing,
            } => {
                let residual = strip_words(clean_query, strip);
                if residual.is_empty() {
                    return missing.to_string();
                }
                tracing::debug!(capability, residual = %residual, "local search trigger");
                let request = InvocationRequest::new(capability).with_arg(parameter, residual);
                executor.execute_request(request).into_speech()
            }
            LocalCommand::Invoke { capability, args } => {
                let request = args
                    .iter()
                    .fold(InvocationRequest::new(capability), |req, (k, v)| {
                        req.with_arg(k, *v)
                    });
                executor.execute_request(request).into_speech()
            }
        }
    }
}

/// Remove every whole-word occurrence of each phrase, then tidy whitespace.
pub(crate) fn strip_words(query: &str, phrases: &[&str]) -> String {
    let mut words: Vec<&str> = query.split_whitespace().collect();
    for phrase in phrases {
        let target: Vec<&str> = phrase.split_whitespace().collect();
        if target.is_empty() {
            continue;
        }
        let mut i = 0;
        while i + target.len() <= words.len() {
            if words[i..i + target.len()] == target[..] {
                words.drain(i..i + target.len());
            } else {
                i += 1;
            }
        }
    }
    collapse_whitespace(&words.join(" "))
}

pub(crate) struct TriggerEntry {
    pub(crate) prefix: String,
    handler: Box<dyn TriggerHandler>,
}

impl TriggerEntry {
    pub(crate) fn handle(&self, clean_query: &str, executor: &CapabilityExecutor) -> String {
        self.handler.handle(clean_query, executor)
    }
}

/// Ordered prefix table; earlier registrations win.
#[derive(Default)]
pub(crate) struct TriggerTable {
    entries: Vec<TriggerEntry>,
}

impl TriggerTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, prefix: &str, handler: impl TriggerHandler + 'static) {
        self.entries.push(TriggerEntry {
            prefix: prefix.trim().to_lowercase(),
            handler: Box::new(handler),
        });
    }

    #[cfg(test)]
    pub(crate) fn register_fn<F>(&mut self, prefix: &str, f: F)
    where
        F: Fn(&str, &CapabilityExecutor) -> String + Send + Sync + 'static,
    {
        self.register(prefix, FnHandler(f));
    }

    pub(crate) fn find(&self, clean_query: &str) -> Option<&TriggerEntry> {
        self.entries
            .iter()
            .find(|entry| clean_query.starts_with(entry.prefix.as_str()))
    }

    pub(crate) fn prefixes(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.prefix.as_str()).collect()
    }

    pub(crate) fn with_defaults() -> Self {
        const YOUTUBE: LocalCommand = LocalCommand::Search {
            capability: "handle_youtube",
            parameter: "search_query",
            strip: &["youtube"],
            missing: "Sorry, I didn't catch what to search for on YouTube.",
        };
        const GOOGLE: LocalCommand = LocalCommand::Search {
            capability: "handle_google",
            parameter: "search_query",
            strip: &["google", "search"],
            missing: "Sorry, I didn't catch what to search for on Google.",
        };
        const WIKIPEDIA: LocalCommand = LocalCommand::Search {
            capability: "handle_wikipedia",
            parameter: "topic",
            strip: &["wikipedia"],
            missing: "Sorry, I didn't catch what to search for on Wikipedia.",
        };
        const WIKIHOW: LocalCommand = LocalCommand::Search {
            capability: "handle_wikihow",
            parameter: "task",
            strip: &["wikihow", "how to"],
            missing: "Sorry, I didn't catch what you want to know how to do.",
        };
        const fn invoke(capability: &'static str) -> LocalCommand {
            LocalCommand::Invoke {
                capability,
                args: &[],
            }
        }

        let mut table = Self::new();
        table.register("youtube", YOUTUBE);
        table.register("google", GOOGLE);
        table.register("search", GOOGLE);
        table.register("wikipedia", WIKIPEDIA);
        table.register("wikihow", WIKIHOW);
        table.register("how to", WIKIHOW);
        table.register("screenshot", invoke("handle_screenshot"));
        table.register("time", invoke("handle_time"));
        table.register("battery", invoke("handle_battery"));
        table.register("power left", invoke("handle_battery"));
        table.register("internet speed", invoke("handle_internet_speed"));
        table.register(
            "volume up",
            LocalCommand::Invoke {
                capability: "handle_volume",
                args: &[("direction", "up")],
            },
        );
        table.register(
            "volume down",
            LocalCommand::Invoke {
                capability: "handle_volume",
                args: &[("direction", "down")],
            },
        );
        table.register(
            "mute",
            LocalCommand::Invoke {
                capability: "handle_volume",
                args: &[("direction", "mute")],
            },
        );
        table.register(
            "volume mute",
            LocalCommand::Invoke {
                capability: "handle_volume",
                args: &[("direction", "mute")],
            },
        );
        table.register("play music", invoke("handle_play_music"));
        table.register(
            "open code",
            LocalCommand::Invoke {
                capability: "handle_open_app",
                args: &[("app_name", "code")],
            },
        );
        table.register(
            "open notepad",
            LocalCommand::Invoke {
                capability: "handle_open_app",
                args: &[("app_name", "notepad")],
            },
        );
        table.register("sleep", invoke("handle_sleep"));
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_executor;

    #[test]
    fn default_order_is_stable() {
        let table = TriggerTable::with_defaults();
        assert_eq!(table.prefixes().len(), 19);
        assert_eq!(
            table.prefixes(),
            vec![
                "youtube", "google", "search", "wikipedia", "wikihow", "how to", "screenshot",
                "time", "battery", "power left", "internet speed", "volume up", "volume down",
                "mute", "volume mute", "play music", "open code", "open notepad", "sleep",
            ]
        );
    }

    #[test]
    fn first_registered_prefix_wins() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        let mut table = TriggerTable::new();
        table.register_fn("volume up", |_, _| "specific".to_string());
        table.register_fn("volume", |_, _| "generic".to_string());
        let entry = table.find("volume up please").unwrap();
        assert_eq!(entry.handle("volume up please", &exec), "specific");
        assert_eq!(table.find("volume down").unwrap().prefix, "volume");
        assert!(table.find("what is up").is_none());
    }

    #[test]
    fn strip_words_removes_whole_words_only() {
        assert_eq!(strip_words("google search rust traits", &["google", "search"]), "rust traits");
        assert_eq!(strip_words("how to tie a tie", &["wikihow", "how to"]), "tie a tie");
        assert_eq!(strip_words("youtube youtubers", &["youtube"]), "youtubers");
        assert_eq!(strip_words("youtube", &["youtube"]), "");
    }

    #[test]
    fn empty_search_asks_again() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        let table = TriggerTable::with_defaults();
        let entry = table.find("youtube").unwrap();
        assert_eq!(
            entry.handle("youtube", &exec),
            "Sorry, I didn't catch what to search for on YouTube."
        );
    }

    #[test]
    fn time_trigger_goes_through_executor() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        let table = TriggerTable::with_defaults();
        let reply = table.find("time please").unwrap().handle("time please", &exec);
        assert!(reply.starts_with("Sir, the time is"));
    }
}
