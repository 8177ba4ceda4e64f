use crate::ServiceError;

const CALCULATE_HELP: &str = "Sorry, I can only calculate simple expressions like '5 plus 2'.";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

fn parse_operator(word: &str) -> Option<Operator> {
    match word {
        "+" | "plus" => Some(Operator::Add),
        "-" | "minus" => Some(Operator::Sub),
        "x" | "*" | "times" | "multiplied" => Some(Operator::Mul),
        "/" | "divided" | "by" => Some(Operator::Div),
        _ => None,
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        let rounded = (value * 1e6).round() / 1e6;
        format!("{rounded}")
    }
}

/// Evaluate `<int> <op> <int>`; `None` when the shape or arithmetic is invalid.
pub(crate) fn evaluate_binary(expression: &str) -> Option<String> {
    let lowered = expression
        .to_lowercase()
        .replace("multiplied by", "multiplied")
        .replace("divided by", "divided");
    let parts: Vec<&str> = lowered.split_whitespace().collect();
    let [lhs, op, rhs] = parts.as_slice() else {
        return None;
    };
    let lhs: i64 = lhs.parse().ok()?;
    let rhs: i64 = rhs.parse().ok()?;
    match parse_operator(op)? {
        Operator::Add => lhs.checked_add(rhs).map(|v| v.to_string()),
        Operator::Sub => lhs.checked_sub(rhs).map(|v| v.to_string()),
        Operator::Mul => lhs.checked_mul(rhs).map(|v| v.to_string()),
        Operator::Div => {
            if rhs == 0 {
                return None;
            }
            Some(format_number(lhs as f64 / rhs as f64))
        }
    }
}

pub(crate) fn calculate(expression: &str) -> String {
    match evaluate_binary(expression) {
        Some(result) => format!("The result is {result}"),
        None => CALCULATE_HELP.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Length,
    Mass,
    Volume,
    Time,
    Speed,
    Data,
    Temperature,
}

struct Unit {
    names: &'static [&'static str],
    dimension: Dimension,
    /// Multiplier into the dimension's base unit; unused for temperature.
    factor: f64,
}

#[rustfmt::skip]
const UNITS: &[Unit] = &[
    // length, base metre
    Unit { names: &["mm", "millimeter", "millimeters", "millimetre", "millimetres"], dimension: Dimension::Length, factor: 0.001 },
    Unit { names: &["cm", "centimeter", "centimeters", "centimetre", "centimetres"], dimension: Dimension::Length, factor: 0.01 },
    Unit { names: &["m", "meter", "meters", "metre", "metres"], dimension: Dimension::Length, factor: 1.0 },
    Unit { names: &["km", "kilometer", "kilometers", "kilometre", "kilometres"], dimension: Dimension::Length, factor: 1000.0 },
    Unit { names: &["in", "inch", "inches"], dimension: Dimension::Length, factor: 0.0254 },
    Unit { names: &["ft", "foot", "feet"], dimension: Dimension::Length, factor: 0.3048 },
    Unit { names: &["yd", "yard", "yards"], dimension: Dimension::Length, factor: 0.9144 },
    Unit { names: &["mi", "mile", "miles"], dimension: Dimension::Length, factor: 1609.344 },
    // mass, base kilogram
    Unit { names: &["mg", "milligram", "milligrams"], dimension: Dimension::Mass, factor: 1e-6 },
    Unit { names: &["g", "gram", "grams"], dimension: Dimension::Mass, factor: 0.001 },
    Unit { names: &["kg", "kilogram", "kilograms", "kilo", "kilos"], dimension: Dimension::Mass, factor: 1.0 },
    Unit { names: &["t", "tonne", "tonnes", "ton", "tons"], dimension: Dimension::Mass, factor: 1000.0 },
    Unit { names: &["oz", "ounce", "ounces"], dimension: Dimension::Mass, factor: 0.028_349_523_125 },
    Unit { names: &["lb", "lbs", "pound", "pounds"], dimension: Dimension::Mass, factor: 0.453_592_37 },
    // volume, base litre
    Unit { names: &["ml", "milliliter", "milliliters", "millilitre", "millilitres"], dimension: Dimension::Volume, factor: 0.001 },
    Unit { names: &["l", "liter", "liters", "litre", "litres"], dimension: Dimension::Volume, factor: 1.0 },
    Unit { names: &["cup", "cups"], dimension: Dimension::Volume, factor: 0.236_588_236_5 },
    Unit { names: &["pint", "pints"], dimension: Dimension::Volume, factor: 0.473_176_473 },
    Unit { names: &["gal", "gallon", "gallons"], dimension: Dimension::Volume, factor: 3.785_411_784 },
    // time, base second
    Unit { names: &["ms", "millisecond", "milliseconds"], dimension: Dimension::Time, factor: 0.001 },
    Unit { names: &["s", "sec", "second", "seconds"], dimension: Dimension::Time, factor: 1.0 },
    Unit { names: &["min", "minute", "minutes"], dimension: Dimension::Time, factor: 60.0 },
    Unit { names: &["h", "hr", "hour", "hours"], dimension: Dimension::Time, factor: 3600.0 },
    Unit { names: &["day", "days"], dimension: Dimension::Time, factor: 86_400.0 },
    Unit { names: &["week", "weeks"], dimension: Dimension::Time, factor: 604_800.0 },
    // speed, base metre per second
    Unit { names: &["m/s", "mps"], dimension: Dimension::Speed, factor: 1.0 },
    Unit { names: &["km/h", "kph", "kmh"], dimension: Dimension::Speed, factor: 1000.0 / 3600.0 },
    Unit { names: &["mph"], dimension: Dimension::Speed, factor: 0.447_04 },
    Unit { names: &["knot", "knots"], dimension: Dimension::Speed, factor: 0.514_444 },
    // data, base byte
    Unit { names: &["b", "byte", "bytes"], dimension: Dimension::Data, factor: 1.0 },
    Unit { names: &["kb", "kilobyte", "kilobytes"], dimension: Dimension::Data, factor: 1e3 },
    Unit { names: &["mb", "megabyte", "megabytes"], dimension: Dimension::Data, factor: 1e6 },
    Unit { names: &["gb", "gigabyte", "gigabytes"], dimension: Dimension::Data, factor: 1e9 },
    Unit { names: &["tb", "terabyte", "terabytes"], dimension: Dimension::Data, factor: 1e12 },
    // temperature
    Unit { names: &["c", "celsius", "degc", "degree celsius", "degrees celsius"], dimension: Dimension::Temperature, factor: 0.0 },
    Unit { names: &["f", "fahrenheit", "degf", "degree fahrenheit", "degrees fahrenheit"], dimension: Dimension::Temperature, factor: 0.0 },
    Unit { names: &["k", "kelvin", "kelvins"], dimension: Dimension::Temperature, factor: 0.0 },
];

fn unknown_unit(name: &str) -> ServiceError {
    ServiceError::InvalidInput(format!("I don't know the unit '{}'.", name.trim()))
}

fn lookup_unit(name: &str) -> Option<&'static Unit> {
    let name = name.trim().trim_end_matches('.').to_lowercase();
    UNITS.iter().find(|u| u.names.contains(&name.as_str()))
}

fn to_kelvin(value: f64, unit: &Unit) -> f64 {
    match unit.names[0] {
        "c" => value + 273.15,
        "f" => (value - 32.0) * 5.0 / 9.0 + 273.15,
        _ => value,
    }
}

fn from_kelvin(value: f64, unit: &Unit) -> f64 {
    match unit.names[0] {
        "c" => value - 273.15,
        "f" => (value - 273.15) * 9.0 / 5.0 + 32.0,
        _ => value,
    }
}

fn format_quantity(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}

/// Convert `"<value> <unit> to <unit>"`, e.g. `10 meters to feet`.
pub(crate) fn convert_units(query: &str) -> Result<String, ServiceError> {
    let format_error = || {
        ServiceError::InvalidInput(
            "Please format your query as 'value unit to other_unit'.".to_string(),
        )
    };
    let lowered = query.to_lowercase();
    let (from_part, to_part) = lowered.split_once(" to ").ok_or_else(format_error)?;
    let from_part = from_part.trim();
    let split_at = from_part
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == ','))
        .ok_or_else(format_error)?;
    let (number, from_name) = from_part.split_at(split_at);
    let value: f64 = number
        .replace(',', "")
        .parse()
        .map_err(|_| format_error())?;
    let from = lookup_unit(from_name).ok_or_else(|| unknown_unit(from_name))?;
    let to = lookup_unit(to_part).ok_or_else(|| unknown_unit(to_part))?;
    if from.dimension != to.dimension {
        return Err(ServiceError::InvalidInput(format!(
            "I can't convert {} to {}.",
            from_name.trim(),
            to_part.trim()
        )));
    }
    let converted = if from.dimension == Dimension::Temperature {
        from_kelvin(to_kelvin(value, from), to)
    } else {
        value * from.factor / to.factor
    };
    Ok(format!(
        "{} {} is {} {}",
        format_quantity(value),
        from_name.trim(),
        format_quantity(converted),
        to_part.trim()
    ))
}
