//! Typed entries for the `Services` and `Outbounds` sections

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

fn empty_mode() -> Value {
    json!({"Mode": ""})
}

fn empty_type() -> Value {
    json!({"Type": ""})
}

/// A listening service entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Listen")]
    pub listen: u16,
    #[serde(rename = "IPAccess", default = "empty_mode")]
    pub ip_access: Value,
    #[serde(rename = "Outbound", default = "empty_type")]
    pub outbound: Value,
}

impl ServiceEntry {
    pub fn new(name: impl Into<String>, listen: u16) -> Self {
        Self {
            name: name.into(),
            listen,
            ip_access: empty_mode(),
            outbound: empty_type(),
        }
    }
}

/// An upstream target entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "TargetAddress")]
    pub target_address: String,
    #[serde(rename = "TargetPort")]
    pub target_port: u16,
    #[serde(rename = "Minecraft", default)]
    pub minecraft: Option<Value>,
    #[serde(rename = "ProxyOptions", default)]
    pub proxy_options: Option<Value>,
    /// Extra fields are kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OutboundEntry {
    pub fn new(name: impl Into<String>, target_address: impl Into<String>, target_port: u16) -> Self {
        Self {
            name: name.into(),
            target_address: target_address.into(),
            target_port,
            minecraft: None,
            proxy_options: None,
            extra: Map::new(),
        }
    }

    /// Fill `Minecraft` and `ProxyOptions` when the caller left them out.
    pub fn with_defaults(mut self) -> Self {
        if self.minecraft.is_none() {
            self.minecraft = Some(default_minecraft_options());
        }
        if self.proxy_options.is_none() {
            self.proxy_options = Some(empty_type());
        }
        self
    }
}

/// Stock Minecraft options written for new outbounds
pub fn default_minecraft_options() -> Value {
    json!({
        "EnableHostnameRewrite": true,
        "OnlineCount": {
            "Max": 20,
            "Online": -1,
            "EnableMaxLimit": false
        },
        "HostnameAccess": {"Mode": ""},
        "NameAccess": {"Mode": ""},
        "PingMode": "",
        "MotdFavicon": "{DEFAULT_MOTD}",
        "MotdDescription": "§d{NAME}§e, provided by §a§o{INFO}§r\n§c§lProxy for §6§n{HOST}:{PORT}§r"
    })
}
