//! 占位符保护模块
//!
//! 此模块负责：
//! - 在翻译前把格式说明符、模板插值、URL、邮箱、HTML实体替换为不透明标记
//! - 翻译后把标记还原为原始子串
//! - 检查翻译引擎是否丢失或破坏了标记
//! - 统计占位符类型与复杂度（仅用于报告）

// 标准库导入
use std::fmt;

// 第三方crate导入
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// 一次保护/还原周期内的 标记 → 原始子串 映射
pub type PlaceholderMap = IndexMap<String, String>;

/// 标记前缀与后缀。只包含 `[A-Z0-9_]`，任何低优先级模式都无法匹配它
const TOKEN_PREFIX: &str = "__PH_";
const TOKEN_SUFFIX: &str = "__";

/// 占位符类型，按优先级从高到低排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    Url,
    Email,
    FunctionCall,
    TemplateLiteral,
    DoubleBrace,
    PositionalFormat,
    ParametrizedFormat,
    PositionalBrace,
    NamedBrace,
    HtmlEntity,
    SimpleFormat,
}

impl PlaceholderKind {
    /// 按优先级排列的全部类型
    pub const ALL: [PlaceholderKind; 11] = [
        PlaceholderKind::Url,
        PlaceholderKind::Email,
        PlaceholderKind::FunctionCall,
        PlaceholderKind::TemplateLiteral,
        PlaceholderKind::DoubleBrace,
        PlaceholderKind::PositionalFormat,
        PlaceholderKind::ParametrizedFormat,
        PlaceholderKind::PositionalBrace,
        PlaceholderKind::NamedBrace,
        PlaceholderKind::HtmlEntity,
        PlaceholderKind::SimpleFormat,
    ];

    fn pattern(self) -> &'static str {
        match self {
            PlaceholderKind::Url => r#"https?://[^\s<>"{}|\\^`\[\]]+"#,
            PlaceholderKind::Email => r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
            PlaceholderKind::FunctionCall => r"\{[a-zA-Z_$][\w$]*\([^)]*\)\}",
            PlaceholderKind::TemplateLiteral => r"\$\{[^}]+\}",
            PlaceholderKind::DoubleBrace => r"\{\{[^}]+\}\}",
            PlaceholderKind::PositionalFormat => r"%\d+\$[sdifDFuUxXoOeEgGcpn@]",
            PlaceholderKind::ParametrizedFormat => r"%[+-]?\d*\.?\d*[sdifDFuUxXoOeEgGcpn@]",
            PlaceholderKind::PositionalBrace => r"\{\d+\}",
            PlaceholderKind::NamedBrace => r"\{[a-zA-Z_]\w*\}",
            PlaceholderKind::HtmlEntity => r"&[a-zA-Z]+;|&#\d+;|&#x[0-9a-fA-F]+;",
            PlaceholderKind::SimpleFormat => r"%[sdif@]",
        }
    }

    /// 类型名称（用于统计输出）
    pub fn as_str(self) -> &'static str {
        match self {
            PlaceholderKind::Url => "url",
            PlaceholderKind::Email => "email",
            PlaceholderKind::FunctionCall => "function_call",
            PlaceholderKind::TemplateLiteral => "template_literal",
            PlaceholderKind::DoubleBrace => "double_brace",
            PlaceholderKind::PositionalFormat => "positional_format",
            PlaceholderKind::ParametrizedFormat => "parametrized_format",
            PlaceholderKind::PositionalBrace => "positional_brace",
            PlaceholderKind::NamedBrace => "named_brace",
            PlaceholderKind::HtmlEntity => "html_entity",
            PlaceholderKind::SimpleFormat => "simple_format",
        }
    }
}

impl fmt::Display for PlaceholderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次保护过程中识别出的占位符
#[derive(Debug, Clone)]
struct ProtectedSpan {
    token: String,
    original: String,
    kind: PlaceholderKind,
}

/// 占位符保护器
///
/// 模式按优先级依次扫描，每个模式的匹配按文本逆序替换，
/// 避免替换导致同一轮中后续匹配的偏移失效。
/// 已被高优先级模式消费的子串不会被再次保护。
#[derive(Debug, Clone)]
pub struct PlaceholderProtector {
    patterns: Vec<(PlaceholderKind, Regex)>,
}

impl PlaceholderProtector {
    /// 创建保护器并编译全部模式
    pub fn new() -> Self {
        let patterns = PlaceholderKind::ALL
            .iter()
            .filter_map(|kind| match Regex::new(kind.pattern()) {
                Ok(regex) => Some((*kind, regex)),
                Err(e) => {
                    tracing::error!("❌ 占位符模式编译失败 {}: {}", kind, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// 保护文本中的占位符，返回保护后的文本与映射表
    pub fn protect(&self, text: &str) -> (String, PlaceholderMap) {
        let (protected, spans) = self.protect_spans(text);
        let map = spans
            .into_iter()
            .map(|span| (span.token, span.original))
            .collect();
        (protected, map)
    }

    /// 把保护后的文本还原为原始文本
    pub fn restore(&self, protected: &str, map: &PlaceholderMap) -> String {
        if map.is_empty() {
            return protected.to_string();
        }
        let mut restored = protected.to_string();
        for (token, original) in map {
            if restored.contains(token.as_str()) {
                restored = restored.replace(token.as_str(), original);
            }
        }
        restored
    }

    /// 批量保护。没有占位符的键不会出现在返回的映射表集合中
    pub fn protect_batch(
        &self,
        texts: &IndexMap<String, String>,
    ) -> (IndexMap<String, String>, IndexMap<String, PlaceholderMap>) {
        let mut protected_texts = IndexMap::with_capacity(texts.len());
        let mut maps = IndexMap::new();

        for (key, text) in texts {
            let (protected, map) = self.protect(text);
            protected_texts.insert(key.clone(), protected);
            if !map.is_empty() {
                maps.insert(key.clone(), map);
            }
        }

        debug!(
            "🛡️ 批量保护完成: {} 条文本, {} 条包含占位符",
            texts.len(),
            maps.len()
        );
        (protected_texts, maps)
    }

    /// 批量还原。没有映射表的键原样透传
    pub fn restore_batch(
        &self,
        texts: &IndexMap<String, String>,
        maps: &IndexMap<String, PlaceholderMap>,
    ) -> IndexMap<String, String> {
        texts
            .iter()
            .map(|(key, text)| {
                let restored = match maps.get(key) {
                    Some(map) => self.restore(text, map),
                    None => text.clone(),
                };
                (key.clone(), restored)
            })
            .collect()
    }

    /// 检查还原后的译文是否保留了全部原始占位符
    ///
    /// 返回丢失的原始子串列表，空列表表示完整保留。
    pub fn validate_preservation(
        &self,
        original: &str,
        restored: &str,
        map: &PlaceholderMap,
    ) -> Vec<String> {
        let mut expected: IndexMap<&str, usize> = IndexMap::new();
        for value in map.values() {
            *expected.entry(value.as_str()).or_insert(0) += 1;
        }

        expected
            .into_iter()
            .filter(|(value, count)| {
                let required = (*count).min(original.matches(value).count());
                restored.matches(value).count() < required
            })
            .map(|(value, _)| value.to_string())
            .collect()
    }

    /// 按类型列出文本中的占位符
    pub fn analyze(&self, text: &str) -> IndexMap<PlaceholderKind, Vec<String>> {
        let (_, spans) = self.protect_spans(text);
        let mut found: IndexMap<PlaceholderKind, Vec<String>> = IndexMap::new();
        for span in spans {
            found.entry(span.kind).or_default().push(span.original);
        }
        // 逆序替换导致同类匹配倒序，这里恢复文本顺序
        for matches in found.values_mut() {
            matches.reverse();
        }
        found.sort_keys();
        found
    }

    fn protect_spans(&self, text: &str) -> (String, Vec<ProtectedSpan>) {
        let mut working = text.to_string();
        let mut spans: Vec<ProtectedSpan> = Vec::new();

        if text.is_empty() {
            return (working, spans);
        }

        for (kind, regex) in &self.patterns {
            let ranges: Vec<(usize, usize)> = regex
                .find_iter(&working)
                .map(|m| (m.start(), m.end()))
                .collect();
            if ranges.is_empty() {
                continue;
            }

            // 已生成标记所占的区间，与之重叠的匹配视为已被消费
            let occupied: Vec<(usize, usize)> = spans
                .iter()
                .flat_map(|s| {
                    working
                        .match_indices(s.token.as_str())
                        .map(|(i, t)| (i, i + t.len()))
                        .collect::<Vec<_>>()
                })
                .collect();

            for (start, end) in ranges.into_iter().rev() {
                if occupied.iter().any(|&(a, b)| start < b && a < end) {
                    continue;
                }
                let original = working[start..end].to_string();
                let token = fresh_token(&working, &spans);
                working.replace_range(start..end, &token);
                spans.push(ProtectedSpan {
                    token,
                    original,
                    kind: *kind,
                });
            }
        }

        (working, spans)
    }
}

impl Default for PlaceholderProtector {
    fn default() -> Self {
        Self::new()
    }
}

/// 生成当前文本中不存在的新标记
fn fresh_token(text: &str, spans: &[ProtectedSpan]) -> String {
    loop {
        let hex = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        let token = format!("{}{}{}", TOKEN_PREFIX, hex, TOKEN_SUFFIX);
        if !text.contains(&token) && spans.iter().all(|s| s.token != token) {
            return token;
        }
    }
}

/// 占位符统计工具
pub struct PlaceholderStats;

impl PlaceholderStats {
    /// 统计一批字符串中各类型占位符的数量
    pub fn count_by_type(
        protector: &PlaceholderProtector,
        texts: &[String],
    ) -> IndexMap<PlaceholderKind, usize> {
        let mut counts: IndexMap<PlaceholderKind, usize> = IndexMap::new();
        for text in texts {
            for (kind, matches) in protector.analyze(text) {
                *counts.entry(kind).or_insert(0) += matches.len();
            }
        }
        counts.sort_keys();
        counts
    }

    /// 复杂度评分，取值 [0, 1]
    ///
    /// `0.6 * 含占位符字符串占比 + 0.4 * min(平均占位符数 / 3, 1)`，保留三位小数。
    pub fn complexity_score(protector: &PlaceholderProtector, texts: &[String]) -> f64 {
        if texts.is_empty() {
            return 0.0;
        }

        let mut with_placeholders = 0usize;
        let mut total = 0usize;
        for text in texts {
            let count: usize = protector.analyze(text).values().map(Vec::len).sum();
            if count > 0 {
                with_placeholders += 1;
            }
            total += count;
        }

        let n = texts.len() as f64;
        let density = with_placeholders as f64 / n;
        let average = total as f64 / n;
        let score = density * 0.6 + (average / 3.0).min(1.0) * 0.4;
        (score * 1000.0).round() / 1000.0
    }
}
