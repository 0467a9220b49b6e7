use uaparser::{Parser, UserAgentParser};

use super::version_string;
use crate::enrichment::UserAgentInfo;

pub struct UaParserEngine {
    parser: UserAgentParser,
}

impl UaParserEngine {
    pub fn from_yaml(path: &str) -> anyhow::Result<Self> {
        let parser = UserAgentParser::from_yaml(path)
            .map_err(|e| anyhow::anyhow!("Failed to load ua-parser regexes '{}': {}", path, e))?;
        Ok(Self { parser })
    }

    pub fn parse(&self, ua: &str) -> UserAgentInfo {
        let client = self.parser.parse(ua);

        UserAgentInfo {
            browser_family: client.user_agent.family.to_string(),
            browser_version: version_string([
                client.user_agent.major.as_deref(),
                client.user_agent.minor.as_deref(),
                client.user_agent.patch.as_deref(),
            ]),
            platform_family: client.os.family.to_string(),
            platform_version: version_string([
                client.os.major.as_deref(),
                client.os.minor.as_deref(),
                client.os.patch.as_deref(),
                client.os.patch_minor.as_deref(),
            ]),
            device_family: client.device.family.to_string(),
            device_brand: client.device.brand.as_deref().map(str::to_owned),
        }
    }
}
