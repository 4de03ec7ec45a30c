use crate::geometry::{Placement, Size, FALLBACK_SIZE};
use crate::popup::{Mode, PopupSpec};
use anyhow::{Context, Result};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub placements: Configuration,
}

/// Instance-wide overrides shared by every popup spec.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "GeneralConfig::default_offset")]
    pub offset: f64,
    #[serde(default)]
    pub disable_flip: bool,
    #[serde(default = "GeneralConfig::default_fallback_width")]
    pub fallback_width: f64,
    #[serde(default = "GeneralConfig::default_fallback_height")]
    pub fallback_height: f64,
}

impl GeneralConfig {
    fn default_offset() -> f64 { 8.0 }
    fn default_fallback_width() -> f64 { FALLBACK_SIZE.width }
    fn default_fallback_height() -> f64 { FALLBACK_SIZE.height }

    pub fn fallback_size(&self) -> Size {
        Size::new(self.fallback_width, self.fallback_height)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            offset: 8.0,
            disable_flip: false,
            fallback_width: FALLBACK_SIZE.width,
            fallback_height: FALLBACK_SIZE.height,
        }
    }
}

/// Hover and click specs defined for one placement.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlacementEntry {
    #[serde(default)]
    pub hover: Option<PopupSpec>,
    #[serde(default)]
    pub click: Option<PopupSpec>,
}

impl PlacementEntry {
    pub fn get(&self, mode: Mode) -> Option<&PopupSpec> {
        match mode {
            Mode::Hover => self.hover.as_ref(),
            Mode::Click => self.click.as_ref(),
        }
    }

    fn slot(&mut self, mode: Mode) -> &mut Option<PopupSpec> {
        match mode {
            Mode::Hover => &mut self.hover,
            Mode::Click => &mut self.click,
        }
    }
}

/// Popup specs keyed by placement, in definition order.
///
/// Order matters: trigger hover only reaches the first placement with a
/// hover spec, and click opens every click spec in this order.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    entries: Vec<(Placement, PlacementEntry)>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or replace) the spec for one (placement, mode) cell.
    #[must_use]
    pub fn with(mut self, placement: Placement, mode: Mode, spec: PopupSpec) -> Self {
        *self.entry_mut(placement).slot(mode) = Some(spec);
        self
    }

    fn entry_mut(&mut self, placement: Placement) -> &mut PlacementEntry {
        let idx = match self.entries.iter().position(|(p, _)| *p == placement) {
            Some(idx) => idx,
            None => {
                self.entries.push((placement, PlacementEntry::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx].1
    }

    pub fn get(&self, placement: Placement, mode: Mode) -> Option<&PopupSpec> {
        self.entries
            .iter()
            .find(|(p, _)| *p == placement)
            .and_then(|(_, entry)| entry.get(mode))
    }

    /// Every defined (placement, mode) pair in definition order.
    pub fn pairs(&self) -> impl Iterator<Item = (Placement, Mode)> + '_ {
        self.entries.iter().flat_map(|(placement, entry)| {
            [Mode::Hover, Mode::Click]
                .into_iter()
                .filter(move |mode| entry.get(*mode).is_some())
                .map(move |mode| (*placement, mode))
        })
    }

    /// Mutable access to every defined spec, e.g. to attach callbacks
    /// before handing the configuration to a trigger.
    pub fn specs_mut(&mut self) -> impl Iterator<Item = (Placement, Mode, &mut PopupSpec)> + '_ {
        self.entries.iter_mut().flat_map(|(placement, entry)| {
            let placement = *placement;
            let hover = entry.hover.as_mut().map(|spec| (placement, Mode::Hover, spec));
            let click = entry.click.as_mut().map(|spec| (placement, Mode::Click, spec));
            hover.into_iter().chain(click)
        })
    }

    pub fn first_hover(&self) -> Option<Placement> {
        self.placements_for(Mode::Hover).next()
    }

    pub fn placements_for(&self, mode: Mode) -> impl Iterator<Item = Placement> + '_ {
        self.pairs().filter(move |(_, m)| *m == mode).map(|(p, _)| p)
    }

    pub fn len(&self) -> usize {
        self.pairs().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'de> Deserialize<'de> for Configuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ConfigurationVisitor;

        impl<'de> Visitor<'de> for ConfigurationVisitor {
            type Value = Configuration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of placements (top, left, right, bottom)")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Configuration, A::Error> {
                let mut entries: Vec<(Placement, PlacementEntry)> = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    let placement: Placement = key.parse().map_err(de::Error::custom)?;
                    let entry: PlacementEntry = map.next_value()?;
                    if entries.iter().any(|(p, _)| *p == placement) {
                        return Err(de::Error::custom(format!(
                            "placement '{}' defined twice",
                            placement
                        )));
                    }
                    entries.push((placement, entry));
                }
                Ok(Configuration { entries })
            }
        }

        deserializer.deserialize_map(ConfigurationVisitor)
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("popover")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).with_context(|| "parsing config TOML")
    }

    /// Whether a spec may flip. The global switch and the spec's own switch
    /// must both allow it.
    pub fn allow_flip(&self, spec: &PopupSpec) -> bool {
        !self.general.disable_flip && !spec.disable_flip
    }

    pub fn offset_for(&self, spec: &PopupSpec) -> f64 {
        spec.offset.unwrap_or(self.general.offset)
    }
}

pub fn socket_path() -> PathBuf {
    // POPOVERD_SOCK overrides for testing.
    if let Ok(path) = std::env::var("POPOVERD_SOCK") {
        return PathBuf::from(path);
    }
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("popoverd.sock")
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- defaults ---

    #[test]
    fn default_offset_is_8() {
        let config = Config::default();
        assert_eq!(config.general.offset, 8.0);
    }

    #[test]
    fn default_flip_is_enabled() {
        let config = Config::default();
        assert!(!config.general.disable_flip);
    }

    #[test]
    fn default_fallback_size_is_200_by_40() {
        let config = Config::default();
        assert_eq!(config.general.fallback_size(), Size::new(200.0, 40.0));
    }

    #[test]
    fn default_has_no_placements() {
        assert!(Config::default().placements.is_empty());
    }

    // --- TOML parsing ---

    #[test]
    fn parse_minimal_toml() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.general.offset, 8.0);
        assert!(config.placements.is_empty());
    }

    #[test]
    fn parse_hover_and_click_specs() {
        let toml = r#"
[general]
offset = 12

[placements.top.hover]
element = "Saves the document"
open_delay_ms = 150
close_delay_ms = 100
enterable = true

[placements.right.click]
element = "Menu"
offset = 4.0
disable_flip = true
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.general.offset, 12.0);

        let hover = config.placements.get(Placement::Top, Mode::Hover).unwrap();
        assert_eq!(hover.open_delay_ms, 150);
        assert_eq!(hover.close_delay_ms, 100);
        assert!(hover.enterable);
        assert_eq!(config.offset_for(hover), 12.0);

        let click = config.placements.get(Placement::Right, Mode::Click).unwrap();
        assert_eq!(config.offset_for(click), 4.0);
        assert!(!config.allow_flip(click));

        assert!(config.placements.get(Placement::Top, Mode::Click).is_none());
        assert!(config.placements.get(Placement::Left, Mode::Hover).is_none());
    }

    #[test]
    fn placements_keep_document_order() {
        let toml = r#"
[placements.bottom.hover]
element = "b"

[placements.top.hover]
element = "t"

[placements.left.click]
element = "l"
"#;
        let config = Config::parse(toml).unwrap();
        let pairs: Vec<_> = config.placements.pairs().collect();
        assert_eq!(
            pairs,
            vec![
                (Placement::Bottom, Mode::Hover),
                (Placement::Top, Mode::Hover),
                (Placement::Left, Mode::Click),
            ]
        );
        assert_eq!(config.placements.first_hover(), Some(Placement::Bottom));
    }

    #[test]
    fn unknown_placement_is_rejected() {
        let toml = r#"
[placements.middle.hover]
element = "x"
"#;
        assert!(Config::parse(toml).is_err());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let toml = r#"
[placements.top.focus]
element = "x"
"#;
        assert!(Config::parse(toml).is_err());
    }

    #[test]
    fn duplicate_placement_is_rejected_from_json() {
        let json = r#"{"top": {"hover": {"element": "a"}}, "top": {"click": {"element": "b"}}}"#;
        let result: Result<Configuration, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn global_disable_flip_overrides_spec() {
        let mut config = Config::default();
        config.general.disable_flip = true;
        assert!(!config.allow_flip(&PopupSpec::new("x")));
    }

    // --- programmatic construction ---

    #[test]
    fn builder_merges_modes_under_one_placement() {
        let placements = Configuration::new()
            .with(Placement::Left, Mode::Click, PopupSpec::new("c"))
            .with(Placement::Top, Mode::Hover, PopupSpec::new("h"))
            .with(Placement::Left, Mode::Hover, PopupSpec::new("lh"));
        assert_eq!(placements.len(), 3);
        assert_eq!(placements.first_hover(), Some(Placement::Left));
        let clicks: Vec<_> = placements.placements_for(Mode::Click).collect();
        assert_eq!(clicks, vec![Placement::Left]);
    }

    #[test]
    fn specs_mut_visits_every_spec() {
        let mut placements = Configuration::new()
            .with(Placement::Top, Mode::Hover, PopupSpec::new("a"))
            .with(Placement::Top, Mode::Click, PopupSpec::new("b"));
        for (_, _, spec) in placements.specs_mut() {
            spec.enterable = true;
        }
        assert!(placements.get(Placement::Top, Mode::Hover).unwrap().enterable);
        assert!(placements.get(Placement::Top, Mode::Click).unwrap().enterable);
    }

    // --- socket path ---

    #[test]
    fn socket_path_ends_with_popoverd_sock() {
        let path = socket_path();
        assert!(path.to_string_lossy().ends_with(".sock"));
    }
}
