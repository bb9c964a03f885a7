use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ahash::HashMap;
use clap::Parser;
use dyn_clone::DynClone;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Registers an override handler for a specific config key
macro_rules! register_override {
    ($key:literal, $func:expr) => {
        inventory::submit! {
            OverrideHandler {
                key: $key,
                apply: $func,
            }
        }
    };
}

struct OverrideHandler {
    key: &'static str,
    apply: fn(config: &mut Config, value: &str),
}

// Collect all OverrideHandler submitted from anywhere in the crate
inventory::collect!(OverrideHandler);

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineArgs {
    #[arg(long, short)]
    pub config: String,
    #[arg(long = "set", value_parser = parse_key_val)]
    pub overrides: Vec<(String, String)>,
}

impl CommandLineArgs {
    pub fn new_with_path(path: impl ToString) -> Self {
        CommandLineArgs {
            config: path.to_string(),
            overrides: Vec::new(),
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=');
    match pos {
        Some(pos) => Ok((s[..pos].to_string(), s[pos + 1..].to_string())),
        None => Err(format!("invalid KEY=VALUE: no `=` found in `{s}`")),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to open config file at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Config {
    // modules are inserted with their defaults on first read, which happens through &self
    modules: Mutex<HashMap<String, Box<dyn ConfigModule>>>,
    #[serde(skip)]
    context: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            modules: Mutex::new(HashMap::default()),
            context: None,
        }
    }
}

impl TryFrom<CommandLineArgs> for Config {
    type Error = ConfigError;

    fn try_from(args: CommandLineArgs) -> Result<Self, Self::Error> {
        let mut config = Config::from_file(Path::new(&args.config))?;
        config.apply_overrides(&args.overrides);
        Ok(config)
    }
}

impl Config {
    pub fn from_file(config_path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(config_path).map_err(|source| ConfigError::Io {
            path: config_path.to_path_buf(),
            source,
        })?;
        let mut config: Config =
            serde_yaml::from_reader(BufReader::new(file)).map_err(|source| ConfigError::Parse {
                path: config_path.to_path_buf(),
                source,
            })?;
        config.set_context(Some(config_path.to_path_buf()));
        Ok(config)
    }

    pub fn set_context(&mut self, context: Option<PathBuf>) {
        self.context = context;
    }

    pub fn context(&self) -> &Option<PathBuf> {
        &self.context
    }

    /// Apply generic key-value overrides to the config, e.g. simulation.end_time=3600
    pub fn apply_overrides(&mut self, overrides: &[(String, String)]) {
        if overrides.is_empty() {
            return;
        }
        info!("Applying overrides: {:?}", overrides);

        for (key, value) in overrides {
            let key_str = key.as_str();

            if let Some(handler) = inventory::iter::<OverrideHandler>().find(|h| h.key == key_str) {
                (handler.apply)(self, value);
            } else {
                warn!("No override handler found for key: {}", key);
            }
        }
    }

    pub fn simulation(&self) -> Simulation {
        self.module_or_default("simulation")
    }

    pub fn set_simulation(&mut self, simulation: Simulation) {
        self.set_module("simulation", simulation);
    }

    pub fn network_engine(&self) -> NetworkEngine {
        self.module_or_default("network_engine")
    }

    pub fn set_network_engine(&mut self, network_engine: NetworkEngine) {
        self.set_module("network_engine", network_engine);
    }

    pub fn modes(&self) -> Modes {
        self.module_or_default("modes")
    }

    pub fn set_modes(&mut self, modes: Modes) {
        self.set_module("modes", modes);
    }

    pub fn output(&self) -> Output {
        self.module_or_default("output")
    }

    pub fn set_output(&mut self, output: Output) {
        self.set_module("output", output);
    }

    /// The output directory. A relative directory is resolved against the directory of the
    /// config file.
    pub fn output_dir(&self) -> PathBuf {
        let output_dir = self.output().output_dir;
        match self.context.as_ref().and_then(|path| path.parent()) {
            Some(parent) if output_dir.is_relative() => parent.join(output_dir),
            _ => output_dir,
        }
    }

    fn module_or_default<T: ConfigModule + Default + Clone + 'static>(&self, key: &str) -> T {
        if let Some(module) = self.module::<T>(key) {
            module
        } else {
            let default = T::default();
            self.modules
                .lock()
                .insert(key.to_string(), Box::new(default.clone()));
            default
        }
    }

    fn set_module<T: ConfigModule + 'static>(&mut self, key: &str, module: T) {
        self.modules.lock().insert(key.to_string(), Box::new(module));
    }

    fn module<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.modules
            .lock()
            .get(key)
            .and_then(|boxed| boxed.as_ref().as_any().downcast_ref::<T>().cloned())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Simulation {
    pub start_time: u32,
    pub end_time: u32,
    pub sample_size: f32,
    /// Modes which must have a travel time function when the network engine is prepared
    pub main_modes: Vec<String>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            start_time: 0,
            end_time: 86400,
            sample_size: 1.0,
            main_modes: vec!["car".to_string()],
        }
    }
}

register_override!("simulation.start_time", |config, value| {
    let mut simulation = config.simulation();
    match value.parse() {
        Ok(v) => simulation.start_time = v,
        Err(e) => warn!("Ignoring simulation.start_time={value}: {e}"),
    }
    config.set_simulation(simulation);
});

register_override!("simulation.end_time", |config, value| {
    let mut simulation = config.simulation();
    match value.parse() {
        Ok(v) => simulation.end_time = v,
        Err(e) => warn!("Ignoring simulation.end_time={value}: {e}"),
    }
    config.set_simulation(simulation);
});

register_override!("simulation.sample_size", |config, value| {
    let mut simulation = config.simulation();
    match value.parse() {
        Ok(v) => simulation.sample_size = v,
        Err(e) => warn!("Ignoring simulation.sample_size={value}: {e}"),
    }
    config.set_simulation(simulation);
});

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NetworkEngine {
    /// Seconds of simulated time between two status lines
    #[serde(default = "default_info_period")]
    pub info_period: u32,
}

fn default_info_period() -> u32 {
    3600
}

impl Default for NetworkEngine {
    fn default() -> Self {
        Self {
            info_period: default_info_period(),
        }
    }
}

register_override!("network_engine.info_period", |config, value| {
    let mut network_engine = config.network_engine();
    match value.parse() {
        Ok(v) => network_engine.info_period = v,
        Err(e) => warn!("Ignoring network_engine.info_period={value}: {e}"),
    }
    config.set_network_engine(network_engine);
});

/// Travel time functions per mode name
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Modes {
    pub travel_times: BTreeMap<String, TravelTimeKind>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub enum TravelTimeKind {
    FreeSpeed,
    /// Speed in meters per second
    ConstantSpeed { speed: f32 },
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            travel_times: BTreeMap::from([
                (String::from("car"), TravelTimeKind::FreeSpeed),
                (
                    String::from("bike"),
                    TravelTimeKind::ConstantSpeed { speed: 6.01 },
                ),
                (
                    String::from("walk"),
                    TravelTimeKind::ConstantSpeed { speed: 1.34 },
                ),
            ]),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Output {
    pub output_dir: PathBuf,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./"),
            logging: Logging::default(),
        }
    }
}

register_override!("output.output_dir", |config, value| {
    let mut output = config.output();
    output.output_dir = PathBuf::from(value);
    config.set_output(output);
});

/// Have this extra layer of log level enum, as tracing subscriber has no
/// off/none option by default. At least it can't be parsed
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub enum Logging {
    #[default]
    None,
    Info,
}

#[typetag::serde(tag = "type")]
pub trait ConfigModule: Debug + Send + DynClone {
    fn as_any(&self) -> &dyn Any;
}

#[typetag::serde]
impl ConfigModule for Simulation {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[typetag::serde]
impl ConfigModule for NetworkEngine {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[typetag::serde]
impl ConfigModule for Modes {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[typetag::serde]
impl ConfigModule for Output {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

// This is needed to allow cloning of the trait object.
dyn_clone::clone_trait_object!(ConfigModule);

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use tempfile::NamedTempFile;

    use crate::simulation::config::{
        CommandLineArgs, Config, ConfigError, Logging, Modes, NetworkEngine, Output, Simulation,
        TravelTimeKind, parse_key_val,
    };

    fn write_temp_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn read_from_yaml() {
        let mut config = Config::default();
        config.set_simulation(Simulation {
            start_time: 7200,
            end_time: 42000,
            sample_size: 0.1,
            main_modes: vec!["bike".to_string()],
        });
        config.set_network_engine(NetworkEngine { info_period: 60 });

        let yaml = serde_yaml::to_string(&config).expect("Failed to serialize yaml");
        let parsed_config: Config = serde_yaml::from_str(&yaml).expect("failed to parse config");

        assert_eq!(parsed_config.simulation().start_time, 7200);
        assert_eq!(parsed_config.simulation().end_time, 42000);
        assert_eq!(parsed_config.simulation().sample_size, 0.1);
        assert_eq!(parsed_config.simulation().main_modes, vec!["bike"]);
        assert_eq!(parsed_config.network_engine().info_period, 60);
    }

    #[test]
    fn read_modes() {
        let yaml = r#"
        modules:
          modes:
            type: Modes
            travel_times:
              car: FreeSpeed
              walk: !ConstantSpeed
                speed: 1.5
        "#;
        let parsed_config: Config = serde_yaml::from_str(yaml).expect("failed to parse config");
        let modes = parsed_config.modes();

        assert_eq!(2, modes.travel_times.len());
        assert_eq!(TravelTimeKind::FreeSpeed, modes.travel_times["car"]);
        assert_eq!(
            TravelTimeKind::ConstantSpeed { speed: 1.5 },
            modes.travel_times["walk"]
        );
    }

    #[test]
    fn defaults_for_missing_modules() {
        let yaml = r#"
        modules:
          network_engine:
            type: NetworkEngine
        "#;
        let config: Config = serde_yaml::from_str(yaml).expect("failed to parse config");

        assert_eq!(3600, config.network_engine().info_period);
        assert_eq!(0, config.simulation().start_time);
        assert_eq!(86400, config.simulation().end_time);
        assert_eq!(vec!["car"], config.simulation().main_modes);
        assert_eq!(Modes::default().travel_times, config.modes().travel_times);
        assert_eq!(Logging::None, config.output().logging);
        assert_eq!(Logging::None, Output::default().logging);
    }

    #[test]
    fn test_override_simulation() {
        let yaml = r#"
modules:
  simulation:
    type: Simulation
    start_time: 0
    end_time: 100
    sample_size: 1.0
    main_modes: [car]
"#;
        let file = write_temp_config(yaml);
        let args = CommandLineArgs {
            config: file.path().to_str().unwrap().to_string(),
            overrides: vec![
                ("simulation.end_time".to_string(), "3600".to_string()),
                ("simulation.sample_size".to_string(), "0.25".to_string()),
                ("simulation.start_time".to_string(), "not a number".to_string()),
                ("unknown.key".to_string(), "1".to_string()),
            ],
        };
        let config = Config::try_from(args).unwrap();

        assert_eq!(0, config.simulation().start_time);
        assert_eq!(3600, config.simulation().end_time);
        assert_eq!(0.25, config.simulation().sample_size);
    }

    #[test]
    fn test_override_info_period() {
        let file = write_temp_config("modules: {}\n");
        let mut args = CommandLineArgs::new_with_path(file.path().to_str().unwrap());
        args.overrides
            .push(("network_engine.info_period".to_string(), "900".to_string()));

        let config = Config::try_from(args).unwrap();

        assert_eq!(900, config.network_engine().info_period);
    }

    #[test]
    fn test_override_output_dir() {
        let yaml = r#"
modules:
  output:
    type: Output
    output_dir: out
"#;
        let file = write_temp_config(yaml);
        let args = CommandLineArgs {
            config: file.path().to_str().unwrap().to_string(),
            overrides: vec![("output.output_dir".to_string(), "new_out".to_string())],
        };
        let config = Config::try_from(args).unwrap();
        assert_eq!(config.output().output_dir.to_str().unwrap(), "new_out");
        assert_eq!(config.output().logging, Logging::None);
    }

    #[test]
    fn output_dir_relative_to_config() {
        let mut config = Config::default();
        config.set_output(Output {
            output_dir: PathBuf::from("out"),
            logging: Logging::None,
        });
        config.set_context(Some(PathBuf::from("/scenario/config.yml")));

        assert_eq!(PathBuf::from("/scenario/out"), config.output_dir());
    }

    #[test]
    fn missing_file() {
        let result = Config::from_file(&PathBuf::from("./does/not/exist.yml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn invalid_yaml() {
        let file = write_temp_config("modules: [1, 2");
        let result = Config::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            Ok(("a.b".to_string(), "c=d".to_string())),
            parse_key_val("a.b=c=d")
        );
        assert!(parse_key_val("no-separator").is_err());
    }
}
