use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::Local;
use lopdf::Document as PdfDocument;
use rand::seq::IndexedRandom;
use walkdir::WalkDir;

use crate::config_file::{CommandConfig, PathConfig};
use crate::{
    build_external_command, command_spec_to_argv, run_action_command, run_command_with_timeout,
    substitute_args, CommandSpec, ServiceError,
};

const ACTION_TIMEOUT_MS: u64 = 15_000;

const WEB_SITES: &[(&str, &str)] = &[
    ("gmail", "https://gmail.com"),
    ("google", "https://google.com"),
    ("instagram", "https://instagram.com"),
    ("facebook", "https://facebook.com"),
    ("chat", "https://chat.openai.com"),
    ("wikipedia", "https://wikipedia.com"),
];

const JOKES: &[&str] = &[
    "Why do programmers prefer dark mode? Because light attracts bugs.",
    "There are 10 kinds of people in the world: those who understand binary and those who don't.",
    "A SQL query walks into a bar, walks up to two tables and asks: can I join you?",
    "How many programmers does it take to change a light bulb? None, that's a hardware problem.",
    "Why did the developer go broke? Because he used up all his cache.",
    "I would tell you a UDP joke, but you might not get it.",
    "Debugging is like being the detective in a crime movie where you are also the murderer.",
    "To understand recursion, you must first understand recursion.",
    "Why do Java developers wear glasses? Because they don't C sharp.",
    "Knock knock. Race condition. Who's there?",
];

fn default_opener() -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec!["open".to_string()]
    } else if cfg!(windows) {
        vec![
            "cmd".to_string(),
            "/C".to_string(),
            "start".to_string(),
            String::new(),
        ]
    } else {
        vec!["xdg-open".to_string()]
    }
}

/// Launch a program without waiting for it; the assistant keeps listening.
fn spawn_detached(argv: &[String]) -> Result<(), ServiceError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| ServiceError::Command("empty command".to_string()))?;
    build_external_command(program, args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ServiceError::Command(format!("could not start {program}: {e}")))?;
    Ok(())
}

fn configured_argv(spec: &CommandSpec) -> Result<Vec<String>, ServiceError> {
    command_spec_to_argv(spec).map_err(ServiceError::Command)
}

/// Hand a URL or file to the desktop's default handler.
pub(crate) fn open_target(cmds: &CommandConfig, target: &str) -> Result<(), ServiceError> {
    let mut argv = match &cmds.opener {
        Some(spec) => configured_argv(spec)?,
        None => default_opener(),
    };
    argv.push(target.to_string());
    tracing::debug!(location = target, "opening");
    spawn_detached(&argv)
}

pub(crate) fn search_url(base: &str, key: &str, query: &str) -> Result<String, ServiceError> {
    url::Url::parse_with_params(base, &[(key, query)])
        .map(|u| u.to_string())
        .map_err(|e| ServiceError::Internal(format!("bad search URL: {e}")))
}

pub(crate) fn open_youtube(cmds: &CommandConfig, query: &str) -> Result<String, ServiceError> {
    let url = search_url("https://www.youtube.com/results", "search_query", query)?;
    open_target(cmds, &url)?;
    Ok(format!("Done, I've opened YouTube results for {query}."))
}

pub(crate) fn open_google(cmds: &CommandConfig, query: &str) -> Result<String, ServiceError> {
    let url = search_url("https://www.google.com/search", "q", query)?;
    open_target(cmds, &url)?;
    Ok(format!("Opening Google search results for {query}."))
}

pub(crate) fn site_url(site_name: &str) -> Option<&'static str> {
    let site = site_name.trim().to_lowercase();
    WEB_SITES
        .iter()
        .find(|(name, _)| *name == site)
        .map(|(_, url)| *url)
}

pub(crate) fn open_website(cmds: &CommandConfig, site_name: &str) -> Result<String, ServiceError> {
    let site = site_name.trim().to_lowercase();
    match site_url(&site) {
        Some(url) => {
            open_target(cmds, url)?;
            Ok(format!("Opening {site}."))
        }
        None => Ok(format!("Sorry, I don't have a URL for {site}.")),
    }
}

pub(crate) fn open_app(cmds: &CommandConfig, app_name: &str) -> Result<String, ServiceError> {
    let wanted = app_name.trim().to_lowercase();
    let Some((name, spec)) = cmds.apps.iter().find(|(name, _)| wanted.contains(name.as_str()))
    else {
        return Ok(format!("Sorry, I can't open the app '{wanted}'."));
    };
    spawn_detached(&configured_argv(spec)?)?;
    Ok(format!("Opening {name}."))
}

pub(crate) fn open_camera(cmds: &CommandConfig) -> Result<String, ServiceError> {
    let spec = cmds
        .camera
        .as_ref()
        .ok_or(ServiceError::NotConfigured("The camera command"))?;
    spawn_detached(&configured_argv(spec)?)?;
    Ok("Opening camera.".to_string())
}

pub(crate) fn adjust_volume(cmds: &CommandConfig, direction: &str) -> Result<String, ServiceError> {
    let direction = direction.to_lowercase();
    let (spec, reply, label) = if direction.contains("up") {
        (&cmds.volume_up, "Volume up.", "volume up")
    } else if direction.contains("down") {
        (&cmds.volume_down, "Volume down.", "volume down")
    } else if direction.contains("mute") {
        (&cmds.volume_mute, "Volume muted.", "volume mute")
    } else {
        return Ok("Sorry, I didn't understand that volume command.".to_string());
    };
    let spec = spec
        .as_ref()
        .ok_or(ServiceError::NotConfigured("The volume command"))?;
    run_action_command(&configured_argv(spec)?, ACTION_TIMEOUT_MS, label)
        .map_err(ServiceError::Command)?;
    Ok(reply.to_string())
}

pub(crate) fn screenshot_file_name(now: chrono::DateTime<Local>) -> String {
    format!("screenshot_{}.png", now.format("%Y-%m-%d_%H-%M-%S"))
}

pub(crate) fn take_screenshot(
    cmds: &CommandConfig,
    paths: &PathConfig,
) -> Result<String, ServiceError> {
    let spec = cmds
        .screenshot
        .as_ref()
        .ok_or(ServiceError::NotConfigured("The screenshot command"))?;
    std::fs::create_dir_all(&paths.screenshot_dir)?;
    let file_name = screenshot_file_name(Local::now());
    let target = paths.screenshot_dir.join(&file_name);
    let argv = configured_argv(spec)?;
    let target_str = target.display().to_string();
    let (mut argv, substituted) = substitute_args(&argv, "path", &target_str);
    if !substituted {
        argv.push(target_str);
    }
    run_action_command(&argv, ACTION_TIMEOUT_MS, "screenshot").map_err(ServiceError::Command)?;
    Ok(format!("Screenshot saved as {file_name}"))
}

// === Battery ===

fn sysfs_battery_percent(root: &Path) -> Option<u8> {
    let entries = std::fs::read_dir(root).ok()?;
    let mut batteries: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            std::fs::read_to_string(p.join("type"))
                .map(|t| t.trim() == "Battery")
                .unwrap_or(false)
        })
        .collect();
    batteries.sort();
    batteries.iter().find_map(|p| {
        std::fs::read_to_string(p.join("capacity"))
            .ok()
            .and_then(|c| c.trim().parse::<u8>().ok())
    })
}

fn parse_pmset_percent(output: &str) -> Option<u8> {
    output.split(['\t', ';', ' ']).find_map(|token| {
        token
            .trim()
            .strip_suffix('%')
            .and_then(|n| n.parse::<u8>().ok())
    })
}

fn battery_percent() -> Result<u8, ServiceError> {
    if cfg!(target_os = "macos") {
        let argv = vec!["pmset".to_string(), "-g".to_string(), "batt".to_string()];
        let output = run_command_with_timeout(&argv, None, ACTION_TIMEOUT_MS, "battery")
            .map_err(ServiceError::Command)?;
        return parse_pmset_percent(&output.stdout)
            .ok_or_else(|| ServiceError::Unsupported("No battery was found.".to_string()));
    }
    sysfs_battery_percent(Path::new("/sys/class/power_supply"))
        .ok_or_else(|| ServiceError::Unsupported("No battery was found.".to_string()))
}

pub(crate) fn battery_report() -> Result<String, ServiceError> {
    let percentage = battery_percent()?;
    Ok(format!("Sir, our system has {percentage} percent battery"))
}

// === Music ===

pub(crate) fn list_songs(dir: &Path) -> Result<Vec<PathBuf>, ServiceError> {
    if !dir.is_dir() {
        return Err(ServiceError::InvalidInput(format!(
            "The music directory {} does not exist.",
            dir.display()
        )));
    }
    let mut songs: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.into_path())
        .collect();
    songs.sort();
    Ok(songs)
}

pub(crate) fn play_music(cmds: &CommandConfig, paths: &PathConfig) -> Result<String, ServiceError> {
    let songs = list_songs(&paths.music_dir)?;
    let Some(song) = songs.choose(&mut rand::rng()) else {
        return Ok("Sorry, I couldn't find any songs in your music directory.".to_string());
    };
    open_target(cmds, &song.display().to_string())?;
    let title = song
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(format!("Playing {title}"))
}

pub(crate) fn random_joke() -> String {
    JOKES
        .choose(&mut rand::rng())
        .map(|j| j.to_string())
        .unwrap_or_default()
}

// === PDF ===

pub(crate) fn read_first_page(path: &Path) -> Result<String, ServiceError> {
    let mut document = PdfDocument::load(path)?;
    if document.is_encrypted() && document.decrypt("").is_err() {
        return Err(ServiceError::InvalidInput(
            "The PDF is password protected.".to_string(),
        ));
    }
    document.decompress();
    let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Ok("The PDF is empty and has no pages.".to_string());
    }
    page_numbers.sort_unstable();
    let num_pages = page_numbers.len();
    let text = match document.extract_text(&[page_numbers[0]]) {
        Ok(text) => crate::collapse_whitespace(&text),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "pdf text extraction failed");
            String::new()
        }
    };
    if text.is_empty() {
        return Ok(format!(
            "The PDF has {num_pages} pages, but the first page has no readable text."
        ));
    }
    Ok(format!(
        "The PDF has {num_pages} pages. Here is the text from the first page: {text}"
    ))
}

/// A bare file stem; anything that could leave `pdf_dir` is refused.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', ':', '\0'])
}

pub(crate) fn read_named_pdf(paths: &PathConfig, pdf_name: &str) -> Result<String, ServiceError> {
    let name = pdf_name.trim().to_lowercase();
    let name = name.strip_suffix(".pdf").unwrap_or(&name);
    if !is_plain_name(name) {
        tracing::warn!(pdf_name, "refusing pdf name outside the pdf directory");
        return Err(ServiceError::InvalidInput(
            "Please give just the name of a PDF in your PDF folder.".to_string(),
        ));
    }
    let path = paths.pdf_dir.join(format!("{name}.pdf"));
    if !path.is_file() {
        return Ok("No valid PDF found with that name. Please try again.".to_string());
    }
    read_first_page(&path)
}
