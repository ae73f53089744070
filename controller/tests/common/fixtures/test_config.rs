//! Test configuration builder for creating config directories programmatically

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct TestConfigBuilder {
    temp_dir: TempDir,
    main_config: MainConfigBuilder,
    compute_configs: HashMap<String, ComputeConfigBuilder>,
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        Self {
            temp_dir,
            main_config: MainConfigBuilder::default(),
            compute_configs: HashMap::new(),
        }
    }

    /// Configure main settings
    pub fn with_main_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(MainConfigBuilder) -> MainConfigBuilder,
    {
        self.main_config = f(self.main_config);
        self
    }

    /// Add a compute configuration file
    pub fn with_compute<F>(mut self, file_stem: &str, f: F) -> Self
    where
        F: FnOnce(ComputeConfigBuilder) -> ComputeConfigBuilder,
    {
        let builder = f(ComputeConfigBuilder::default());
        self.compute_configs.insert(file_stem.to_string(), builder);
        self
    }

    /// Build and write config files to temp directory
    pub fn build(self) -> TestConfig {
        let config_dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        fs::write(config_dir.join("main.toml"), self.main_config.to_toml())
            .expect("Failed to write main.toml");

        for (name, builder) in self.compute_configs {
            fs::write(config_dir.join(format!("{}.toml", name)), builder.to_toml())
                .expect("Failed to write compute config");
        }

        TestConfig {
            _temp_dir: self.temp_dir,
            config_dir,
        }
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Config directory that lives as long as this value
pub struct TestConfig {
    _temp_dir: TempDir,
    pub config_dir: PathBuf,
}

impl TestConfig {
    pub fn dir(&self) -> String {
        self.config_dir.to_string_lossy().to_string()
    }
}

/// Main configuration builder
#[derive(Clone, Default)]
pub struct MainConfigBuilder {
    images_path: Option<String>,
    local_compute_enabled: bool,
}

impl MainConfigBuilder {
    pub fn images_path(mut self, path: &str) -> Self {
        self.images_path = Some(path.to_string());
        self
    }

    pub fn local_compute(mut self, enabled: bool) -> Self {
        self.local_compute_enabled = enabled;
        self
    }

    fn to_toml(&self) -> String {
        let mut toml = format!("local_compute_enabled = {}\n", self.local_compute_enabled);
        if let Some(path) = &self.images_path {
            toml.push_str(&format!("images_path = \"{}\"\n", path));
        }
        toml
    }
}

/// Compute configuration builder
#[derive(Clone, Default)]
pub struct ComputeConfigBuilder {
    compute_id: Option<String>,
    protocol: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
}

impl ComputeConfigBuilder {
    pub fn compute_id(mut self, id: &str) -> Self {
        self.compute_id = Some(id.to_string());
        self
    }

    pub fn protocol(mut self, protocol: &str) -> Self {
        self.protocol = Some(protocol.to_string());
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn credentials(mut self, user: &str, password: &str) -> Self {
        self.user = Some(user.to_string());
        self.password = Some(password.to_string());
        self
    }

    fn to_toml(&self) -> String {
        let mut toml = String::new();
        let strings = [
            ("compute_id", &self.compute_id),
            ("protocol", &self.protocol),
            ("host", &self.host),
            ("user", &self.user),
            ("password", &self.password),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                toml.push_str(&format!("{} = \"{}\"\n", key, value));
            }
        }
        if let Some(port) = self.port {
            toml.push_str(&format!("port = {}\n", port));
        }
        toml
    }
}
