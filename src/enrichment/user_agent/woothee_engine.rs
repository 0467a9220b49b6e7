use woothee::parser::Parser;

use crate::enrichment::UserAgentInfo;

const UNKNOWN: &str = "UNKNOWN";

pub struct WootheeEngine {
    parser: Parser,
}

impl WootheeEngine {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    pub fn parse(&self, ua: &str) -> UserAgentInfo {
        let Some(result) = self.parser.parse(ua) else {
            return UserAgentInfo {
                browser_family: UNKNOWN.to_owned(),
                browser_version: UNKNOWN.to_owned(),
                platform_family: UNKNOWN.to_owned(),
                platform_version: UNKNOWN.to_owned(),
                device_family: UNKNOWN.to_owned(),
                device_brand: None,
            };
        };

        let brand = result.vendor.to_string();

        UserAgentInfo {
            browser_family: result.name.to_string(),
            browser_version: result.version.to_string(),
            platform_family: result.os.to_string(),
            platform_version: result.os_version.to_string(),
            device_family: result.category.to_string(),
            device_brand: (!brand.is_empty() && brand != UNKNOWN).then_some(brand),
        }
    }
}

impl Default for WootheeEngine {
    fn default() -> Self {
        Self::new()
    }
}
