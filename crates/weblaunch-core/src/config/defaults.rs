//! Default configuration values

use super::types::Config;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "weblaunch.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "weblaunch.yaml";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".weblaunch.toml",
        ".weblaunch.yaml",
    ]
}

/// Generate default configuration TOML
pub fn default_config_toml() -> String {
    toml::to_string_pretty(&Config::default())
        .unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# weblaunch configuration

[toolchain]
platform = "android-34"
min_sdk = 21
target_sdk = 34
# sdk_root = "/opt/android-sdk"
# java_home = "/usr/lib/jvm/java-17"
# bundletool_jar = "/opt/bundletool.jar"

[timeouts]
resources = 120
compile = 300
dex = 180
package = 120
sign = 60
align = 30
bundle = 300
identity = 30

[paths]
# work_root = "/var/tmp/weblaunch/work"
# artifact_root = "/var/lib/weblaunch/artifacts"

[runtime]
progress_buffer = 64
keep_work_dirs = false
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.toolchain.min_sdk, 21);
        assert_eq!(config.timeouts.sign, 60);
    }

    #[test]
    fn test_default_toml_round_trips() {
        let rendered = default_config_toml();
        let config: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(config.toolchain.platform, "android-34");
    }
}
