//! analysis settings

/// Knobs for one template analysis
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Settings {
    /// Regions the template is analysed for. The first one resolves pseudo-parameters.
    pub regions: Vec<String>,
    /// Upper bound on scenarios returned by a single enumeration
    pub max_scenarios: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            regions: vec![DEFAULT_REGION.to_string()],
            max_scenarios: 128,
        }
    }
}

pub const DEFAULT_REGION: &str = "us-east-1";

impl Settings {
    pub fn primary_region(&self) -> &str {
        self.regions
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_REGION)
    }
}
