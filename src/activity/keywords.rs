//! 机器人关键字命令
//!
//! 以这些前缀开头的消息不经过租约协议，由命令处理器直接应答。

/// 关键字命令（按前缀匹配）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BotMessageKeyword {
    ChatDocument,
    ChatGpt,
    Document,
    Debug,
    Forget,
    History,
    Reset,
    Welcome,
    Me,
}

impl BotMessageKeyword {
    pub const ALL: [BotMessageKeyword; 9] = [
        Self::ChatDocument,
        Self::ChatGpt,
        Self::Document,
        Self::Debug,
        Self::Forget,
        Self::History,
        Self::Reset,
        Self::Welcome,
        Self::Me,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatDocument => "/chatDocument",
            Self::ChatGpt => "/chatGPT",
            Self::Document => "/document",
            Self::Debug => "/debug",
            Self::Forget => "/forget",
            Self::History => "/history",
            Self::Reset => "/reset",
            Self::Welcome => "/welcome",
            Self::Me => "/me",
        }
    }

    /// 文本以某个关键字开头时返回该关键字（区分大小写，与 Teams 客户端发送的命令一致）
    pub fn match_prefix(text: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|keyword| text.starts_with(keyword.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_prefix() {
        assert_eq!(
            BotMessageKeyword::match_prefix("/history"),
            Some(BotMessageKeyword::History)
        );
        assert_eq!(
            BotMessageKeyword::match_prefix("/debug on"),
            Some(BotMessageKeyword::Debug)
        );
        assert_eq!(
            BotMessageKeyword::match_prefix("/chatGPT please"),
            Some(BotMessageKeyword::ChatGpt)
        );
    }

    #[test]
    fn test_plain_text_is_not_keyword() {
        assert_eq!(BotMessageKeyword::match_prefix("what is /history"), None);
        assert_eq!(BotMessageKeyword::match_prefix("/History"), None);
        assert_eq!(BotMessageKeyword::match_prefix(""), None);
    }
}
