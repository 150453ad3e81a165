use super::AgentEvent;
use super::raw::{RawEvent, ToolCallItem};

/// Normalize one raw engine event. Unknown shapes and shapes missing the
/// field a front end would display yield `None`.
pub fn map_raw_event(event: &RawEvent) -> Option<AgentEvent> {
    match event {
        RawEvent::ToolCalled { item } => {
            let (name, arguments) = tool_call_parts(item)?;
            if name.is_empty() {
                return None;
            }
            Some(AgentEvent::ToolCall { name, arguments })
        }
        RawEvent::ReasoningItemCreated { summary } => {
            let first = summary.first()?;
            Some(AgentEvent::Reasoning {
                text: first.text.clone(),
            })
        }
        RawEvent::MessageOutputCreated { content } => {
            let first = content.first()?;
            Some(AgentEvent::MessageOutput {
                text: first.text().to_string(),
            })
        }
        RawEvent::Unrecognized => None,
    }
}

fn tool_call_parts(item: &ToolCallItem) -> Option<(String, String)> {
    let parts = match item {
        ToolCallItem::FunctionCall { name, arguments } | ToolCallItem::McpCall { name, arguments } => {
            (name.clone(), arguments.clone())
        }
        ToolCallItem::LocalShellCall { action } => {
            if action.command.is_empty() {
                return None;
            }
            ("local_shell".to_string(), action.command.join(" "))
        }
        ToolCallItem::FileSearchCall { queries } => ("file_search".to_string(), queries.join(", ")),
        ToolCallItem::WebSearchCall { query, queries } => {
            let arguments = match query {
                Some(q) if queries.is_empty() => q.clone(),
                _ => queries.join(", "),
            };
            ("web_search".to_string(), arguments)
        }
        ToolCallItem::CodeInterpreterCall { code } => ("code_interpreter".to_string(), code.clone()),
        ToolCallItem::ComputerCall { action } => ("computer".to_string(), action.to_string()),
        ToolCallItem::Unknown => return None,
    };
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::raw::{ContentPart, ShellAction, SummaryText};
    use proptest::prelude::*;
    use serde_json::json;

    fn tool_call(name: &str, arguments: &str) -> AgentEvent {
        AgentEvent::ToolCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn test_function_call_arguments_pass_verbatim() {
        let raw = RawEvent::tool_call("list_directory", r#"{"path":"."}"#);
        assert_eq!(map_raw_event(&raw), Some(tool_call("list_directory", r#"{"path":"."}"#)));
    }

    #[test]
    fn test_canonicalizes_builtin_tool_calls() {
        let shell = RawEvent::ToolCalled {
            item: ToolCallItem::LocalShellCall {
                action: ShellAction {
                    command: vec!["ls".into(), "-la".into()],
                },
            },
        };
        assert_eq!(map_raw_event(&shell), Some(tool_call("local_shell", "ls -la")));

        let search = RawEvent::ToolCalled {
            item: ToolCallItem::FileSearchCall {
                queries: vec!["foo".into(), "bar".into()],
            },
        };
        assert_eq!(map_raw_event(&search), Some(tool_call("file_search", "foo, bar")));

        let web = RawEvent::ToolCalled {
            item: ToolCallItem::WebSearchCall {
                query: Some("rust tokio".into()),
                queries: vec![],
            },
        };
        assert_eq!(map_raw_event(&web), Some(tool_call("web_search", "rust tokio")));

        let computer = RawEvent::ToolCalled {
            item: ToolCallItem::ComputerCall {
                action: json!({ "type": "click", "x": 1 }),
            },
        };
        assert_eq!(
            map_raw_event(&computer),
            Some(tool_call("computer", r#"{"type":"click","x":1}"#))
        );
    }

    #[test]
    fn test_reasoning_and_message_take_first_entry() {
        let reasoning = RawEvent::ReasoningItemCreated {
            summary: vec![
                SummaryText { text: "first".into() },
                SummaryText { text: "second".into() },
            ],
        };
        assert_eq!(
            map_raw_event(&reasoning),
            Some(AgentEvent::Reasoning { text: "first".into() })
        );

        let message = RawEvent::message("Here are the files.");
        assert_eq!(
            map_raw_event(&message),
            Some(AgentEvent::MessageOutput {
                text: "Here are the files.".into()
            })
        );
    }

    #[test]
    fn test_empty_subfields_yield_nothing() {
        let empty = [
            RawEvent::ReasoningItemCreated { summary: vec![] },
            RawEvent::MessageOutputCreated { content: vec![] },
            RawEvent::tool_call("", "{}"),
            RawEvent::ToolCalled {
                item: ToolCallItem::LocalShellCall {
                    action: ShellAction { command: vec![] },
                },
            },
            RawEvent::ToolCalled {
                item: ToolCallItem::Unknown,
            },
            RawEvent::Unrecognized,
        ];
        for raw in &empty {
            assert_eq!(map_raw_event(raw), None, "{raw:?}");
        }
    }

    fn raw_event_strategy() -> impl Strategy<Value = RawEvent> {
        prop_oneof![
            ("[a-z_]{1,12}", "[ -~]{0,20}").prop_map(|(n, a)| RawEvent::tool_call(n, a)),
            "[ -~]{1,20}".prop_map(RawEvent::reasoning),
            "[ -~]{1,20}".prop_map(|t| RawEvent::MessageOutputCreated {
                content: vec![ContentPart::OutputText { text: t }],
            }),
            Just(RawEvent::Unrecognized),
            Just(RawEvent::ReasoningItemCreated { summary: vec![] }),
            Just(RawEvent::ToolCalled {
                item: ToolCallItem::Unknown
            }),
        ]
    }

    fn is_recognized(raw: &RawEvent) -> bool {
        match raw {
            RawEvent::ToolCalled { item } => !matches!(item, ToolCallItem::Unknown),
            RawEvent::ReasoningItemCreated { summary } => !summary.is_empty(),
            RawEvent::MessageOutputCreated { content } => !content.is_empty(),
            RawEvent::Unrecognized => false,
        }
    }

    proptest! {
        #[test]
        fn prop_mapping_drops_only_unrecognized_and_keeps_order(
            raws in prop::collection::vec(raw_event_strategy(), 0..40)
        ) {
            let mapped: Vec<AgentEvent> = raws.iter().filter_map(map_raw_event).collect();
            let expected: Vec<AgentEvent> = raws
                .iter()
                .filter(|r| is_recognized(r))
                .map(|r| map_raw_event(r).unwrap())
                .collect();

            prop_assert_eq!(mapped.len(), raws.iter().filter(|r| is_recognized(r)).count());
            prop_assert_eq!(mapped, expected);
        }
    }
}
