mod uaparser_engine;
mod woothee_engine;

use serde::Deserialize;

use super::{UserAgentInfo, UserAgentLookup};

pub use uaparser_engine::UaParserEngine;
pub use woothee_engine::WootheeEngine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UaEngineKind {
    #[default]
    Woothee,
    UaParser,
}

/// `uaparser` needs a ua-parser `regexes.yaml`; woothee ships its own rules.
pub fn build_ua_engine(kind: UaEngineKind, regexes: Option<&str>) -> anyhow::Result<UaEngine> {
    match kind {
        UaEngineKind::UaParser => {
            let path = regexes.ok_or_else(|| {
                anyhow::anyhow!("ua_engine = \"uaparser\" requires ua_regexes to be set")
            })?;
            Ok(UaEngine::UaParser(UaParserEngine::from_yaml(path)?))
        }
        UaEngineKind::Woothee => Ok(UaEngine::Woothee(WootheeEngine::new())),
    }
}

pub enum UaEngine {
    UaParser(UaParserEngine),
    Woothee(WootheeEngine),
}

impl UserAgentLookup for UaEngine {
    fn lookup(&self, user_agent: &str) -> UserAgentInfo {
        match self {
            UaEngine::UaParser(p) => p.parse(user_agent),
            UaEngine::Woothee(p) => p.parse(user_agent),
        }
    }
}

/// Dotted version from leading components, stopping at the first gap.
fn version_string<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    parts
        .into_iter()
        .map_while(|p| p.filter(|s| !s.is_empty()))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_stops_at_first_missing_part() {
        assert_eq!(version_string([Some("96"), Some("0"), None, Some("1")]), "96.0");
        assert_eq!(version_string([None, Some("1")]), "");
        assert_eq!(version_string([Some("10"), Some(""), Some("2")]), "10");
    }

    #[test]
    fn uaparser_requires_regexes() {
        assert!(build_ua_engine(UaEngineKind::UaParser, None).is_err());
    }

    #[test]
    fn woothee_is_the_default_engine() {
        assert_eq!(UaEngineKind::default(), UaEngineKind::Woothee);
        assert!(matches!(
            build_ua_engine(UaEngineKind::Woothee, None),
            Ok(UaEngine::Woothee(_))
        ));
    }
}
