//! 模型输出切分与片段解析
//!
//! 一次批次生成的原始文本按固定分隔符切成若干片段，每个片段对应一道题。
//! 片段内容应是一个 JSON 对象，但模型经常包上 Markdown 代码块或在前后加说明文字。

use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::error::FragmentError;

/// 题目分隔符（会注入提示词，要求模型在每道题前输出）
pub const QUESTION_DELIMITER: &str = "|||QUESTION_START|||";

/// 缺少分隔符时按 "Question N" 标题切分
static QUESTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:\*\*)?[ \t]*(?:Question|QUESTION)[ \t]*\[?[ \t]*(\d+)[ \t]*\]?[ \t]*(?:\*\*|:)?")
        .expect("题目标题正则无效")
});

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:json)?").expect("代码块正则无效"));

static WRAPPER_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:question|q)[ _]?\d+$").expect("包装键正则无效"));

/// 把原始响应切分为片段
///
/// - 含分隔符：第一个分隔符之前的内容视为前言丢弃，空片段跳过
/// - 不含分隔符：尝试按 "Question N" 标题切分
/// - 都失败：整段文本作为一个片段
pub fn split_fragments(text: &str) -> Vec<String> {
    if text.contains(QUESTION_DELIMITER) {
        let fragments: Vec<String> = text
            .split(QUESTION_DELIMITER)
            .skip(1)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        debug!("按分隔符切分出 {} 个片段", fragments.len());
        return fragments;
    }

    warn!("未找到分隔符 '{}'，尝试按题目标题切分", QUESTION_DELIMITER);

    let headers: Vec<_> = QUESTION_HEADER.find_iter(text).collect();
    if !headers.is_empty() {
        let fragments: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let end = headers.get(i + 1).map_or(text.len(), |next| next.start());
                text[header.end()..end].trim().to_string()
            })
            .filter(|part| !part.is_empty())
            .collect();
        if !fragments.is_empty() {
            info!("按题目标题切分出 {} 个片段", fragments.len());
            return fragments;
        }
    }

    warn!("标题切分也失败，整段文本作为一个片段");
    let whole = text.trim();
    if whole.is_empty() {
        Vec::new()
    } else {
        vec![whole.to_string()]
    }
}

/// 切分题目复制的响应，每个片段对应一个变体
///
/// 优先按分隔符切分；没有分隔符时接受 JSON 数组、`{"duplicates": [...]}` 或单个对象
pub fn split_variations(text: &str) -> Vec<String> {
    if text.contains(QUESTION_DELIMITER) {
        return split_fragments(text);
    }

    let cleaned = CODE_FENCE.replace_all(text, "");
    match first_json_list(&cleaned) {
        Some(items) => {
            debug!("从 JSON 中取得 {} 个变体", items.len());
            items
                .into_iter()
                .map(|item| match item {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                })
                .collect()
        }
        None => split_fragments(text),
    }
}

/// 找到第一个可解码的 JSON 数组或对象并展开为列表
fn first_json_list(text: &str) -> Option<Vec<JsonValue>> {
    let mut pos = 0;
    while let Some(offset) = text[pos..].find(['[', '{']) {
        let start = pos + offset;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<JsonValue>();
        match stream.next() {
            Some(Ok(JsonValue::Array(items))) => return Some(items),
            Some(Ok(JsonValue::Object(map))) => {
                if let Some(JsonValue::Array(items)) = map.get("duplicates") {
                    return Some(items.clone());
                }
                return Some(vec![JsonValue::Object(map)]);
            }
            _ => pos = start + 1,
        }
    }
    None
}

/// 从片段中解析出题目 JSON 对象
///
/// 去掉代码块标记后，从第一个 `{` 开始解码第一个 JSON 值，忽略其后的文字。
/// 形如 `{"question1": {...}}` 的单键包装会被拆开。
pub fn parse_fragment(fragment: &str) -> Result<Map<String, JsonValue>, FragmentError> {
    let cleaned = CODE_FENCE.replace_all(fragment, "");
    let start = cleaned.find('{').ok_or(FragmentError::NoJsonObject)?;

    let mut stream = serde_json::Deserializer::from_str(&cleaned[start..]).into_iter::<JsonValue>();
    let value = match stream.next() {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            return Err(FragmentError::Malformed {
                message: e.to_string(),
            })
        }
        None => return Err(FragmentError::NoJsonObject),
    };

    match value {
        JsonValue::Object(map) => Ok(unwrap_question_wrapper(map)),
        other => Err(FragmentError::NotAnObject {
            found: json_type_name(&other).to_string(),
        }),
    }
}

/// 扫描文本中的所有顶层 JSON 对象（解析失败的位置跳过）
pub fn scan_json_objects(text: &str) -> Vec<Map<String, JsonValue>> {
    let mut objects = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<JsonValue>();
        match stream.next() {
            Some(Ok(JsonValue::Object(map))) => {
                objects.push(map);
                pos = start + stream.byte_offset();
            }
            _ => pos = start + 1,
        }
    }

    objects
}

fn unwrap_question_wrapper(mut map: Map<String, JsonValue>) -> Map<String, JsonValue> {
    if map.len() != 1 {
        return map;
    }
    let Some(key) = map
        .keys()
        .next()
        .filter(|k| WRAPPER_KEY.is_match(k.trim()))
        .cloned()
    else {
        return map;
    };

    match map.remove(&key) {
        Some(JsonValue::Object(inner)) => inner,
        Some(other) => {
            map.insert(key, other);
            map
        }
        None => map,
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_skips_preamble_and_empty_parts() {
        let text = format!(
            "Plan: 2 questions\n{d}\n{{\"q\": 1}}\n{d}\n\n{d}{{\"q\": 2}}",
            d = QUESTION_DELIMITER
        );
        let fragments = split_fragments(&text);
        assert_eq!(fragments, vec![r#"{"q": 1}"#, r#"{"q": 2}"#]);
    }

    #[test]
    fn test_split_when_text_starts_with_delimiter() {
        let text = format!("{d}A{d}B", d = QUESTION_DELIMITER);
        assert_eq!(split_fragments(&text), vec!["A", "B"]);
    }

    #[test]
    fn test_fallback_split_on_headers() {
        let text = "Intro\n**Question [1]**\n{\"a\": 1}\nQUESTION 2:\n{\"a\": 2}\n  Question 3\n{\"a\": 3}";
        let fragments = split_fragments(text);
        assert_eq!(fragments, vec![r#"{"a": 1}"#, r#"{"a": 2}"#, r#"{"a": 3}"#]);
    }

    #[test]
    fn test_fallback_whole_text() {
        assert_eq!(split_fragments("  {\"a\": 1} "), vec![r#"{"a": 1}"#]);
        assert!(split_fragments("   ").is_empty());
    }

    #[test]
    fn test_parse_strips_code_fences_and_trailing_text() {
        let fragment = "```json\n{\"Question\": \"Find x\", \"Marks\": 2}\n```\nHope this helps!";
        let map = parse_fragment(fragment).unwrap();
        assert_eq!(map.get("Question"), Some(&json!("Find x")));
        assert_eq!(map.get("Marks"), Some(&json!(2)));
    }

    #[test]
    fn test_parse_handles_braces_inside_strings() {
        let fragment = r#"{"solution": "Set {x} and \\frac{1}{2}", "topic": "sets"}"#;
        let map = parse_fragment(fragment).unwrap();
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_parse_unwraps_question_key() {
        let fragment = r#"{"question1": {"Topic": "AP", "Question": "?"}}"#;
        let map = parse_fragment(fragment).unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["Topic", "Question"]);

        // 值不是对象时保持原样
        let map = parse_fragment(r#"{"question1": "plain"}"#).unwrap();
        assert!(map.contains_key("question1"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_fragment("no json here"), Err(FragmentError::NoJsonObject));
        assert!(matches!(
            parse_fragment(r#"{"question": "unterminated"#),
            Err(FragmentError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_preserves_key_order() {
        let map = parse_fragment(r#"{"z": 1, "a": 2, "m": 3}"#).unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_scan_json_objects_skips_garbage() {
        let text = r#"text {"q": 1} broken {"x": } more {"q": 2} end"#;
        let objects = scan_json_objects(text);
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].get("q"), Some(&json!(2)));
    }

    #[test]
    fn test_split_variations_accepts_arrays_and_wrappers() {
        let text = "Here you go:\n```json\n[{\"question\": \"v1\"}, {\"question\": \"v2\"}]\n```";
        let variations = split_variations(text);
        assert_eq!(variations.len(), 2);
        assert_eq!(parse_fragment(&variations[1]).unwrap().get("question"), Some(&json!("v2")));

        let wrapped = r#"{"duplicates": [{"q": 1}, {"q": 2}, {"q": 3}]}"#;
        assert_eq!(split_variations(wrapped).len(), 3);

        let single = r#"{"question": "only"}"#;
        assert_eq!(split_variations(single), vec![r#"{"question":"only"}"#]);
    }

    #[test]
    fn test_split_variations_prefers_delimiter() {
        let text = format!("{d}\n{{\"q\": 1}}\n{d}\n[1, 2]", d = QUESTION_DELIMITER);
        assert_eq!(split_variations(&text), vec![r#"{"q": 1}"#, "[1, 2]"]);
    }
}
