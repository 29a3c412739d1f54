use serde::{Deserialize, Serialize};

/// Arguments of a send invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendArgs {
    pub message: String,
}

/// Configuration value handed to every lifecycle hook
///
/// `action` selects the mode; `channel` is read in login mode and
/// `args.message` in send mode. Unknown fields from the host are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwitchConfig {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub args: Option<SendArgs>,
}

impl TwitchConfig {
    pub fn login(channel: impl Into<String>) -> Self {
        Self {
            action: Some("login".to_string()),
            channel: Some(channel.into()),
            args: None,
        }
    }

    pub fn send(message: impl Into<String>) -> Self {
        Self {
            action: Some("send".to_string()),
            channel: None,
            args: Some(SendArgs {
                message: message.into(),
            }),
        }
    }

    pub fn receive() -> Self {
        Self {
            action: Some("receive".to_string()),
            ..Self::default()
        }
    }

    /// Mode under the canonical three-mode classification
    pub fn mode(&self) -> Mode {
        Variant::ThreeMode.classify(self)
    }

    pub fn message(&self) -> Option<&str> {
        self.args.as_ref().map(|args| args.message.as_str())
    }
}

/// Operating mode selected by a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Login,
    Send,
    Receive,
    /// Action not recognised; every hook treats it as a no-op
    Unknown,
}

/// Which set of actions the component accepts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Variant {
    /// `login`, `send` and an explicit `receive`
    #[default]
    ThreeMode,
    /// `login` and `send` only; listeners register through login configs
    LoginSend,
}

impl Variant {
    pub fn classify(self, config: &TwitchConfig) -> Mode {
        match config.action.as_deref() {
            None | Some("") | Some("login") => Mode::Login,
            Some("send") => Mode::Send,
            Some("receive") if self == Variant::ThreeMode => Mode::Receive,
            Some(_) => Mode::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_action(action: Option<&str>) -> TwitchConfig {
        TwitchConfig {
            action: action.map(str::to_string),
            ..TwitchConfig::default()
        }
    }

    #[test]
    fn test_login_actions() {
        assert_eq!(with_action(None).mode(), Mode::Login);
        assert_eq!(with_action(Some("")).mode(), Mode::Login);
        assert_eq!(with_action(Some("login")).mode(), Mode::Login);
    }

    #[test]
    fn test_send_and_receive() {
        assert_eq!(with_action(Some("send")).mode(), Mode::Send);
        assert_eq!(with_action(Some("receive")).mode(), Mode::Receive);
        assert_eq!(with_action(Some("shout")).mode(), Mode::Unknown);
    }

    #[test]
    fn test_login_send_variant_has_no_receive() {
        let variant = Variant::LoginSend;
        assert_eq!(variant.classify(&with_action(None)), Mode::Login);
        assert_eq!(variant.classify(&with_action(Some("send"))), Mode::Send);
        assert_eq!(variant.classify(&with_action(Some("receive"))), Mode::Unknown);
    }

    #[test]
    fn test_deserialize_host_values() {
        let send: TwitchConfig = serde_json::from_value(serde_json::json!({
            "action": "send",
            "args": { "message": "hi" },
            "component": "twitch"
        }))
        .unwrap();
        assert_eq!(send.mode(), Mode::Send);
        assert_eq!(send.message(), Some("hi"));

        let login: TwitchConfig =
            serde_json::from_value(serde_json::json!({ "channel": "testchan" })).unwrap();
        assert_eq!(login.mode(), Mode::Login);
        assert_eq!(login.channel.as_deref(), Some("testchan"));
    }
}
