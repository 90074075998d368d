use super::loading::{parse_json, parse_toml};
use super::validation::validate_config;
use super::*;
use serial_test::serial;
use std::fs;
use tempfile::tempdir;

const SAMPLE_TOML: &str = r#"
tz = "Europe/Berlin"
location = { latitude = 52.52, longitude = 13.40 }

[notifications]
command = ["notify-send"]

[[terrariums]]
name = "Desert"

[[terrariums.switches]]
id = "light"
name = "Light"

[[terrariums.switches]]
id = "heat"
name = "Heat mat"
on_command = ["relayctl", "2", "on"]
off_command = ["relayctl", "2", "off"]

[[terrariums.programs]]
name = "Winter"
start = { day = 1, month = 10 }

[[terrariums.programs.rules]]
hours_on = 10.0
switches = ["light"]

[[terrariums.programs.rules]]
hours_on = 12.0
hours_on_increment_per_day = 0.5
switches = ["heat"]
earliest_on = "07:00"
latest_off = "21:30:00"

[[terrariums.programs]]
name = "Summer"
start = { day = 1, month = 4 }
"#;

const SAMPLE_JSON: &str = r#"{
  "tz": "Europe/Zurich",
  "location": { "latitude": 47.37, "longitude": 8.54 },
  "terrariums": [
    {
      "name": "Rainforest",
      "switches": [{ "id": "sw1", "name": "Light" }],
      "programs": [
        {
          "name": "Spring",
          "start": { "day": 1, "month": 3 },
          "rules": [
            { "hoursOn": 11, "hoursOnIncrementPerDay": 0.1, "switches": ["sw1"] }
          ]
        }
      ]
    }
  ]
}"#;

fn sample() -> Configuration {
    parse_toml(SAMPLE_TOML).unwrap()
}

fn assert_invalid(config: &Configuration, needle: &str) {
    let err = validate_config(config).unwrap_err();
    let message = format!("{err:#}");
    assert!(
        message.contains(needle),
        "expected error containing '{needle}', got '{message}'"
    );
}

#[test]
fn test_parse_sample_toml() {
    let config = sample();
    assert_eq!(config.tz, "Europe/Berlin");
    assert_eq!(config.terrariums.len(), 1);

    let desert = &config.terrariums[0];
    assert_eq!(desert.switches.len(), 2);
    assert_eq!(
        desert.switch("heat").unwrap().on_command.as_deref(),
        Some(&["relayctl".to_string(), "2".to_string(), "on".to_string()][..])
    );

    let winter = &desert.programs[0];
    assert_eq!(winter.start, Day::new(1, 10).unwrap());
    assert_eq!(winter.rules[0].hours_on_increment_per_day, 0.0);
    assert!(!winter.rules[0].has_clamps());
    assert_eq!(
        winter.rules[1].earliest_on,
        NaiveTime::from_hms_opt(7, 0, 0)
    );
    assert_eq!(
        winter.rules[1].latest_off,
        NaiveTime::from_hms_opt(21, 30, 0)
    );

    // Programs without rules are allowed
    assert!(desert.programs[1].rules.is_empty());
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_parse_camel_case_json() {
    let config = parse_json(SAMPLE_JSON).unwrap();
    let rule = &config.terrariums[0].programs[0].rules[0];
    assert_eq!(rule.hours_on, 11.0);
    assert_eq!(rule.hours_on_increment_per_day, 0.1);
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_invalid_start_day_rejected_at_parse() {
    let bad = SAMPLE_TOML.replace("{ day = 1, month = 10 }", "{ day = 29, month = 2 }");
    assert!(parse_toml(&bad).is_err());
}

#[test]
fn test_invalid_wall_clock_rejected_at_parse() {
    let bad = SAMPLE_TOML.replace("\"07:00\"", "\"7 o'clock\"");
    assert!(parse_toml(&bad).is_err());
}

#[test]
fn test_unknown_timezone() {
    let mut config = sample();
    config.tz = "Mars/Olympus_Mons".to_string();
    assert_invalid(&config, "not a known IANA timezone");

    config.tz = "  ".to_string();
    assert_invalid(&config, "must not be empty");
}

#[test]
fn test_coordinate_ranges() {
    let mut config = sample();
    config.location.latitude = 91.0;
    assert_invalid(&config, "latitude");

    let mut config = sample();
    config.location.longitude = -180.5;
    assert_invalid(&config, "longitude");

    let mut config = sample();
    config.location.latitude = f64::NAN;
    assert_invalid(&config, "latitude");
}

#[test]
fn test_duplicate_names() {
    let mut config = sample();
    let copy = config.terrariums[0].clone();
    config.terrariums.push(copy);
    assert_invalid(&config, "duplicate terrarium name 'Desert'");

    let mut config = sample();
    let switch = config.terrariums[0].switches[0].clone();
    config.terrariums[0].switches.push(switch);
    assert_invalid(&config, "duplicate switch id 'light'");

    let mut config = sample();
    config.terrariums[0].programs[1].name = "Winter".to_string();
    assert_invalid(&config, "duplicate program name 'Winter'");
}

#[test]
fn test_empty_names() {
    let mut config = sample();
    config.terrariums[0].name = String::new();
    assert_invalid(&config, "terrarium names must not be empty");

    let mut config = sample();
    config.terrariums[0].programs[0].name = " ".to_string();
    assert_invalid(&config, "program names must not be empty");
}

#[test]
fn test_rule_references_unknown_switch() {
    let mut config = sample();
    config.terrariums[0].programs[0].rules[0].switches = vec!["fogger".to_string()];
    assert_invalid(&config, "unknown switch 'fogger'");

    config.terrariums[0].programs[0].rules[0].switches.clear();
    assert_invalid(&config, "at least one switch");
}

#[test]
fn test_rule_numbers_must_be_finite() {
    let mut config = sample();
    config.terrariums[0].programs[0].rules[0].hours_on = f64::INFINITY;
    assert_invalid(&config, "hours_on must be a finite number");

    let mut config = sample();
    config.terrariums[0].programs[0].rules[0].hours_on_increment_per_day = f64::NAN;
    assert_invalid(&config, "hours_on_increment_per_day");
}

#[test]
fn test_rule_hours_are_bounded() {
    let mut config = sample();
    config.terrariums[0].programs[0].rules[0].hours_on = 1e10;
    assert_invalid(&config, "hours_on must be between -24 and 24");

    let mut config = sample();
    config.terrariums[0].programs[0].rules[1].hours_on_increment_per_day = -30.0;
    assert_invalid(&config, "hours_on_increment_per_day must be between");

    // Whole days and negative starts stay valid
    let mut config = sample();
    config.terrariums[0].programs[0].rules[0].hours_on = 24.0;
    config.terrariums[0].programs[0].rules[1].hours_on = -2.0;
    assert!(validate_config(&config).is_ok());
}

#[test]
fn test_clamp_order() {
    let mut config = sample();
    let rule = &mut config.terrariums[0].programs[0].rules[1];
    rule.earliest_on = NaiveTime::from_hms_opt(22, 0, 0);
    assert_invalid(&config, "earliest_on");
}

#[test]
fn test_empty_commands() {
    let mut config = sample();
    config.notifications = Some(NotificationConfig { command: vec![] });
    assert_invalid(&config, "notifications.command");

    let mut config = sample();
    config.terrariums[0].switches[1].off_command = Some(vec![String::new()]);
    assert_invalid(&config, "empty off_command");
}

#[test]
fn test_load_from_path_toml_and_json() {
    let temp_dir = tempdir().unwrap();

    let toml_path = temp_dir.path().join("terracontrol.toml");
    fs::write(&toml_path, SAMPLE_TOML).unwrap();
    let config = load_from_path(&toml_path).unwrap();
    assert_eq!(config.terrariums[0].name, "Desert");

    let json_path = temp_dir.path().join("terracontrol.json");
    fs::write(&json_path, SAMPLE_JSON).unwrap();
    let config = load_from_path(&json_path).unwrap();
    assert_eq!(config.terrariums[0].name, "Rainforest");
}

#[test]
fn test_load_runs_validation() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("broken.toml");
    fs::write(&path, SAMPLE_TOML.replace("Europe/Berlin", "Nowhere/Special")).unwrap();

    let err = load(Some(&path)).unwrap_err();
    assert!(format!("{err:#}").contains("Nowhere/Special"));
}

#[test]
fn test_load_missing_file() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("missing.toml");
    let err = load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
#[serial]
fn test_default_config_path_uses_xdg_config_home() {
    let temp_dir = tempdir().unwrap();
    let config_dir = temp_dir.path().join("terracontrol");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("terracontrol.toml"), SAMPLE_TOML).unwrap();

    // Save and restore XDG_CONFIG_HOME
    let original = std::env::var("XDG_CONFIG_HOME").ok();
    unsafe {
        std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());
    }

    let path = default_config_path();
    let result = Configuration::load(None);

    unsafe {
        match original {
            Some(val) => std::env::set_var("XDG_CONFIG_HOME", val),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
    }

    assert_eq!(path.unwrap(), config_dir.join("terracontrol.toml"));
    assert_eq!(result.unwrap().tz, "Europe/Berlin");
}

#[test]
fn test_timezone_and_switch_iteration() {
    let config = sample();
    assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Berlin);
    let ids: Vec<(&str, &str)> = config
        .all_switches()
        .map(|(terrarium, s)| (terrarium, s.id.as_str()))
        .collect();
    assert_eq!(ids, vec![("Desert", "light"), ("Desert", "heat")]);
}
