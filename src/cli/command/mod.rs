pub mod extract;
pub mod plan;

use anyhow::Result;

pub use extract::{extract, run};
pub use plan::plan;

use crate::config::Config;

/// The default configuration as TOML, ready to be edited and passed back
/// with `--config`.
pub fn default_config() -> Result<String> {
    Ok(Config::default().to_toml_string()?)
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn should_render_default_config() {
        let text = default_config().unwrap();

        assert!(text.contains("location = \"Cape_Verde\""));
        assert!(text.contains("[service]"));
    }
}
