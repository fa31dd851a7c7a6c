//! 计划模型与解析
//!
//! 计划是有序的命令列表：DO 执行一个已注册动作，SAY 向用户发送文本。
//! parse_plan 从 LLM 回复中提取 JSON 计划；没有可用 JSON 时整段回复视为一条 SAY。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// DO 命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoCommand {
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// 与本动作并行执行的兄弟 DO 命令（计划就绪时从主序列中移入）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parallel_actions: Vec<DoCommand>,
}

impl DoCommand {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            parameters: Map::new(),
            parallel_actions: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// SAY 命令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SayCommand {
    #[serde(deserialize_with = "response_text")]
    pub response: String,
}

/// SAY 的 response 既可能是字符串，也可能是 `{"role": "assistant", "content": "..."}`
fn response_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Response {
        Text(String),
        Message { content: Option<String> },
    }
    Ok(match Response::deserialize(deserializer)? {
        Response::Text(text) => text,
        Response::Message { content } => content.unwrap_or_default(),
    })
}

/// 计划中的一条命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PredictedCommand {
    #[serde(rename = "DO")]
    Do(DoCommand),
    #[serde(rename = "SAY")]
    Say(SayCommand),
}

impl PredictedCommand {
    pub fn do_action(action: impl Into<String>) -> Self {
        PredictedCommand::Do(DoCommand::new(action))
    }

    pub fn say(response: impl Into<String>) -> Self {
        PredictedCommand::Say(SayCommand {
            response: response.into(),
        })
    }

    pub fn is_do(&self) -> bool {
        matches!(self, PredictedCommand::Do(_))
    }

    pub fn is_say(&self) -> bool {
        matches!(self, PredictedCommand::Say(_))
    }

    /// DO 命令的动作名
    pub fn action(&self) -> Option<&str> {
        match self {
            PredictedCommand::Do(cmd) => Some(cmd.action.as_str()),
            PredictedCommand::Say(_) => None,
        }
    }
}

fn plan_type() -> String {
    "plan".to_string()
}

/// 计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(rename = "type", default = "plan_type")]
    pub kind: String,
    #[serde(default)]
    pub commands: Vec<PredictedCommand>,
}

impl Default for Plan {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Plan {
    pub fn new(commands: Vec<PredictedCommand>) -> Self {
        Self {
            kind: plan_type(),
            commands,
        }
    }

    /// 至少有一条命令才是可执行的计划
    pub fn is_valid(&self) -> bool {
        !self.commands.is_empty()
    }

    pub fn has_do_command(&self) -> bool {
        self.commands
            .iter()
            .any(|c| matches!(c, PredictedCommand::Do(cmd) if !cmd.action.is_empty()))
    }

    pub fn first_say(&self) -> Option<&str> {
        self.commands.iter().find_map(|c| match c {
            PredictedCommand::Say(say) => Some(say.response.as_str()),
            _ => None,
        })
    }

    /// 计划的最后一条命令是否为该动作的 DO
    pub fn ends_with_action(&self, action: &str) -> bool {
        matches!(self.commands.last(), Some(PredictedCommand::Do(cmd)) if cmd.action == action)
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// 从左到右扫描一遍，遇到紧邻的 (DO, SAY) 就交换。
/// 交换后的 DO 会继续与后面的 SAY 比较，所以一个 DO 会越过它后面连续的 SAY。
pub fn swap_do_and_say(commands: &mut [PredictedCommand]) {
    for i in 0..commands.len().saturating_sub(1) {
        if commands[i].is_do() && commands[i + 1].is_say() {
            commands.swap(i, i + 1);
        }
    }
}

/// 从文本中提取 JSON 片段（```json ... ``` 或首个 `{` 到最后一个 `}`）
fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// 解析 LLM 回复为计划；不是计划 JSON 时整段回复作为一条 SAY
pub fn parse_plan(output: &str) -> Plan {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Plan::default();
    }

    if let Some(json) = extract_json(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(json) {
            if value.get("commands").is_some() {
                if let Ok(plan) = serde_json::from_value::<Plan>(value) {
                    return plan;
                }
            } else if let Some(content) = value.get("content").and_then(Value::as_str) {
                return Plan::new(vec![PredictedCommand::say(content)]);
            }
        }
    }

    Plan::new(vec![PredictedCommand::say(trimmed)])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions(commands: &[PredictedCommand]) -> Vec<String> {
        commands
            .iter()
            .map(|c| match c {
                PredictedCommand::Do(cmd) => format!("DO({})", cmd.action),
                PredictedCommand::Say(say) => format!("SAY({})", say.response),
            })
            .collect()
    }

    #[test]
    fn test_swap_adjacent_pair() {
        let mut cmds = vec![PredictedCommand::do_action("a"), PredictedCommand::say("x")];
        swap_do_and_say(&mut cmds);
        assert_eq!(actions(&cmds), vec!["SAY(x)", "DO(a)"]);
    }

    #[test]
    fn test_swap_say_already_first() {
        let mut cmds = vec![
            PredictedCommand::say("x"),
            PredictedCommand::do_action("a"),
            PredictedCommand::do_action("b"),
        ];
        swap_do_and_say(&mut cmds);
        assert_eq!(actions(&cmds), vec!["SAY(x)", "DO(a)", "DO(b)"]);
    }

    #[test]
    fn test_swap_only_moves_directly_preceding_do() {
        let mut cmds = vec![
            PredictedCommand::do_action("a"),
            PredictedCommand::do_action("b"),
            PredictedCommand::say("x"),
        ];
        swap_do_and_say(&mut cmds);
        assert_eq!(actions(&cmds), vec!["DO(a)", "SAY(x)", "DO(b)"]);
    }

    #[test]
    fn test_swap_do_bubbles_past_consecutive_says() {
        let mut cmds = vec![
            PredictedCommand::do_action("a"),
            PredictedCommand::say("x"),
            PredictedCommand::say("y"),
        ];
        swap_do_and_say(&mut cmds);
        assert_eq!(actions(&cmds), vec!["SAY(x)", "SAY(y)", "DO(a)"]);
    }

    #[test]
    fn test_swap_empty_and_single() {
        let mut empty: Vec<PredictedCommand> = Vec::new();
        swap_do_and_say(&mut empty);
        assert!(empty.is_empty());
        let mut single = vec![PredictedCommand::do_action("a")];
        swap_do_and_say(&mut single);
        assert_eq!(actions(&single), vec!["DO(a)"]);
    }

    #[test]
    fn test_parse_plan_json() {
        let output = r#"```json
{"type":"plan","commands":[
  {"type":"DO","action":"getSemanticInfo","parameters":{"entity":"Contoso"}},
  {"type":"SAY","response":{"role":"assistant","content":"Looking it up"}}
]}
```"#;
        let plan = parse_plan(output);
        assert_eq!(plan.commands.len(), 2);
        assert_eq!(plan.commands[0].action(), Some("getSemanticInfo"));
        assert_eq!(plan.first_say(), Some("Looking it up"));
        assert!(plan.has_do_command());
    }

    #[test]
    fn test_parse_plain_text_is_say() {
        let plan = parse_plan("Hello there");
        assert_eq!(plan.commands, vec![PredictedCommand::say("Hello there")]);
        assert!(!plan.has_do_command());
    }

    #[test]
    fn test_parse_content_object() {
        let plan = parse_plan(r#"{"content": "just text"}"#);
        assert_eq!(plan.first_say(), Some("just text"));
    }

    #[test]
    fn test_parse_invalid_json_is_say() {
        let plan = parse_plan("{not json}");
        assert_eq!(plan.first_say(), Some("{not json}"));
    }

    #[test]
    fn test_serialized_plan_shape() {
        let mut primary = DoCommand::new("a");
        primary.parallel_actions.push(DoCommand::new("b"));
        let plan = Plan::new(vec![PredictedCommand::Do(primary)]);
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["type"], "plan");
        assert_eq!(json["commands"][0]["type"], "DO");
        assert_eq!(json["commands"][0]["parallelActions"][0]["action"], "b");
    }

    #[test]
    fn test_ends_with_action() {
        let plan = Plan::new(vec![
            PredictedCommand::do_action("a"),
            PredictedCommand::say("x"),
        ]);
        assert!(!plan.ends_with_action("a"));
        let plan = Plan::new(vec![PredictedCommand::say("x"), PredictedCommand::do_action("a")]);
        assert!(plan.ends_with_action("a"));
        assert!(!plan.ends_with_action("b"));
    }
}
