//! 本地化资源文件编解码模块
//!
//! 此模块负责：
//! - 识别资源文件格式（JSON / Android XML / iOS strings / Flutter ARB）
//! - 把资源文件展平为有序的 键 → 文本 映射
//! - 用译文重建资源文件，保留原文件的嵌套结构、注释、元数据与未知内容
//! - 生成各格式对应的输出文件名

// 标准库导入
use std::collections::HashSet;
use std::path::Path;

// 第三方crate导入
use indexmap::IndexMap;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

// 本地模块导入
use crate::error::{Result, TranslationError};
use crate::utils::compile_regex;

/// 展平后的 键 → 文本 映射，保持文件中的出现顺序
pub type FlatMap = IndexMap<String, String>;

/// 字符串字面量或注释（iOS strings）
const STRINGS_TOKEN_PATTERN: &str = r#"(?P<string>"(?:[^"\\]|\\.)*")|(?P<comment>/\*[\s\S]*?\*/|//[^\n]*)"#;

/// `"key" = "value";` 键值对（iOS strings）
const STRINGS_PAIR_PATTERN: &str = r#""(?P<key>(?:[^"\\]|\\.)*)"\s*=\s*"(?P<value>(?:[^"\\]|\\.)*)"\s*;"#;

/// 资源文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Json,
    AndroidXml,
    IosStrings,
    Arb,
    Unknown,
}

impl FileFormat {
    /// 格式名称
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Json => "json",
            FileFormat::AndroidXml => "android_xml",
            FileFormat::IosStrings => "ios_strings",
            FileFormat::Arb => "arb",
            FileFormat::Unknown => "unknown",
        }
    }
}

/// 识别资源文件格式，先看扩展名，再看内容形态
pub fn detect(filename: &str, content: &str) -> FileFormat {
    let extension = Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

    match extension.as_deref() {
        Some("json") => return FileFormat::Json,
        Some("xml") => return FileFormat::AndroidXml,
        Some("strings") => return FileFormat::IosStrings,
        Some("arb") => return FileFormat::Arb,
        _ => {}
    }

    let trimmed = content.trim();
    if trimmed.starts_with('{')
        && trimmed.ends_with('}')
        && serde_json::from_str::<Value>(trimmed).is_ok()
    {
        return FileFormat::Json;
    }
    if trimmed.starts_with("<?xml") || trimmed.starts_with("<resources") {
        return FileFormat::AndroidXml;
    }
    if trimmed.contains('"') && trimmed.contains('=') && trimmed.contains(';') {
        return FileFormat::IosStrings;
    }

    debug!("无法识别资源文件格式: {}", filename);
    FileFormat::Unknown
}

/// 解析资源文件，提取全部可翻译文本
pub fn parse(content: &str, format: FileFormat) -> Result<FlatMap> {
    match format {
        FileFormat::Json => parse_json(content),
        FileFormat::Arb => parse_arb(content),
        FileFormat::AndroidXml => parse_android_xml(content),
        FileFormat::IosStrings => parse_ios_strings(content),
        FileFormat::Unknown => Err(TranslationError::UnsupportedFormat(
            "无法识别的资源文件".to_string(),
        )),
    }
}

/// 识别格式并解析
pub fn detect_and_parse(filename: &str, content: &str) -> Result<(FileFormat, FlatMap)> {
    let format = detect(filename, content);
    if format == FileFormat::Unknown {
        return Err(TranslationError::UnsupportedFormat(filename.to_string()));
    }
    Ok((format, parse(content, format)?))
}

/// 用展平映射重建资源文件
///
/// 提供原文件时保留原文件结构，否则生成目标格式的最小合法文档。
pub fn reconstruct(flat: &FlatMap, format: FileFormat, original: Option<&str>) -> Result<String> {
    match format {
        FileFormat::Json => reconstruct_json(flat, original),
        FileFormat::Arb => reconstruct_arb(flat, original),
        FileFormat::AndroidXml => reconstruct_android_xml(flat, original),
        FileFormat::IosStrings => reconstruct_ios_strings(flat, original),
        FileFormat::Unknown => Err(TranslationError::UnsupportedFormat(
            "无法重建未知格式".to_string(),
        )),
    }
}

/// 目标语言对应的输出文件名（归档内路径使用 `/`）
pub fn output_filename(original_filename: &str, lang: &str, format: FileFormat) -> String {
    let path = Path::new(original_filename);
    match format {
        FileFormat::AndroidXml => format!("values-{}/strings.xml", lang),
        FileFormat::Json => format!("{}.json", lang),
        FileFormat::IosStrings => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Localizable.strings".to_string());
            format!("{}.lproj/{}", lang, name)
        }
        FileFormat::Arb => format!("intl_{}.arb", lang),
        FileFormat::Unknown => {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "translated".to_string());
            match path.extension() {
                Some(ext) => format!("{}_{}.{}", stem, lang, ext.to_string_lossy()),
                None => format!("{}_{}", stem, lang),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

fn parse_json_object(content: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(content)? {
        Value::Object(map) => Ok(map),
        _ => Err(TranslationError::Parse("JSON根节点必须是对象".to_string())),
    }
}

fn parse_json(content: &str) -> Result<FlatMap> {
    let root = Value::Object(parse_json_object(content)?);
    let mut flat = FlatMap::new();
    flatten_value(&root, "", &mut flat);
    Ok(flat)
}

fn join_key(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}

/// 只提取字符串叶子，数字、布尔与 null 留在原文档中
fn flatten_value(value: &Value, prefix: &str, out: &mut FlatMap) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_value(child, &join_key(prefix, key), out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_value(child, &join_key(prefix, &index.to_string()), out);
            }
        }
        Value::String(text) => {
            out.insert(prefix.to_string(), text.clone());
        }
        _ => {}
    }
}

/// 原地替换原文档中已知路径上的字符串叶子
fn apply_flat(value: &mut Value, prefix: &str, flat: &FlatMap, used: &mut HashSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                apply_flat(child, &join_key(prefix, key), flat, used);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                apply_flat(child, &join_key(prefix, &index.to_string()), flat, used);
            }
        }
        Value::String(text) => {
            if let Some(translated) = flat.get(prefix) {
                *text = translated.clone();
                used.insert(prefix.to_string());
            }
        }
        _ => {}
    }
}

/// 把点分键还原为嵌套对象路径
fn insert_path(root: &mut Value, key: &str, text: &str) {
    let segments: Vec<&str> = key.split('.').collect();
    let mut current = root;

    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        let next = match current {
            Value::Object(map) => {
                if last {
                    map.insert(segment.to_string(), Value::String(text.to_string()));
                    return;
                }
                map.entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()))
            }
            Value::Array(items) => match segment.parse::<usize>() {
                Ok(index) if index < items.len() => {
                    if last {
                        items[index] = Value::String(text.to_string());
                        return;
                    }
                    &mut items[index]
                }
                _ => {
                    warn!("⚠️ 无法写入数组路径: {}", key);
                    return;
                }
            },
            _ => {
                warn!("⚠️ 键路径与原文档结构冲突: {}", key);
                return;
            }
        };
        current = next;
    }
}

fn reconstruct_json(flat: &FlatMap, original: Option<&str>) -> Result<String> {
    let root = match original {
        Some(content) => {
            let mut root = Value::Object(parse_json_object(content)?);
            let mut used = HashSet::new();
            apply_flat(&mut root, "", flat, &mut used);
            for (key, text) in flat.iter().filter(|(k, _)| !used.contains(k.as_str())) {
                insert_path(&mut root, key, text);
            }
            root
        }
        None => {
            let mut root = Value::Object(Map::new());
            for (key, text) in flat {
                insert_path(&mut root, key, text);
            }
            root
        }
    };
    Ok(serde_json::to_string_pretty(&root)?)
}

// ---------------------------------------------------------------------------
// ARB
// ---------------------------------------------------------------------------

fn parse_arb(content: &str) -> Result<FlatMap> {
    let root = parse_json_object(content)?;
    Ok(root
        .iter()
        .filter(|(key, _)| !key.starts_with('@'))
        .filter_map(|(key, value)| value.as_str().map(|text| (key.clone(), text.to_string())))
        .collect())
}

fn reconstruct_arb(flat: &FlatMap, original: Option<&str>) -> Result<String> {
    let Some(content) = original else {
        let map: Map<String, Value> = flat
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        return Ok(serde_json::to_string_pretty(&Value::Object(map))?);
    };

    let source = parse_json_object(content)?;
    let mut output = Map::new();

    for (key, value) in &source {
        if key.starts_with("@@") {
            output.insert(key.clone(), value.clone());
        } else if let Some(base) = key.strip_prefix('@') {
            // 元数据紧随其键输出，孤立的元数据原位保留
            if !source.contains_key(base) {
                output.insert(key.clone(), value.clone());
            }
        } else {
            let translated = match (flat.get(key), value) {
                (Some(text), Value::String(_)) => Value::String(text.clone()),
                _ => value.clone(),
            };
            output.insert(key.clone(), translated);
            let meta_key = format!("@{}", key);
            if let Some(meta) = source.get(&meta_key) {
                output.insert(meta_key, meta.clone());
            }
        }
    }

    for (key, text) in flat.iter().filter(|(k, _)| !source.contains_key(k.as_str())) {
        output.insert(key.clone(), Value::String(text.clone()));
    }

    Ok(serde_json::to_string_pretty(&Value::Object(output))?)
}

// ---------------------------------------------------------------------------
// Android XML
// ---------------------------------------------------------------------------

/// `<string>` 元素的 name 与 translatable 属性
fn string_element_info(element: &BytesStart) -> Result<(Option<String>, bool)> {
    let mut name = None;
    let mut translatable = true;
    for attr in element.attributes() {
        let attr = attr.map_err(|e| TranslationError::Parse(format!("XML属性错误: {}", e)))?;
        match attr.key.as_ref() {
            b"name" => name = Some(attr.unescape_value()?.into_owned()),
            b"translatable" => translatable = attr.unescape_value()?.as_ref() != "false",
            _ => {}
        }
    }
    Ok((name, translatable))
}

fn parse_android_xml(content: &str) -> Result<FlatMap> {
    let mut reader = Reader::from_reader(content.as_bytes());
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut flat = FlatMap::new();

    let mut depth = 0usize;
    // (name, translatable, 收集到的文本, 所在深度)
    let mut current: Option<(Option<String>, bool, String, usize)> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                if current.is_none() && e.name().as_ref() == b"string" {
                    let (name, translatable) = string_element_info(&e)?;
                    current = Some((name, translatable, String::new(), depth));
                }
            }
            Event::End(_) => {
                if let Some((name, translatable, text, string_depth)) = current.take() {
                    if string_depth == depth {
                        match name {
                            Some(name) if translatable => {
                                flat.insert(name, text);
                            }
                            Some(_) => {}
                            None => debug!("跳过缺少name属性的string元素"),
                        }
                    } else {
                        current = Some((name, translatable, text, string_depth));
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Empty(e) => {
                if current.is_none() && e.name().as_ref() == b"string" {
                    if let (Some(name), true) = string_element_info(&e)? {
                        flat.insert(name, String::new());
                    }
                }
            }
            Event::Text(t) => {
                if let Some((_, _, text, _)) = current.as_mut() {
                    text.push_str(&unescape_android_value(&t.unescape()?));
                }
            }
            Event::CData(c) => {
                if let Some((_, _, text, _)) = current.as_mut() {
                    let data = std::str::from_utf8(&c)
                        .map_err(|e| TranslationError::Parse(format!("CDATA编码错误: {}", e)))?;
                    text.push_str(data);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth != 0 {
        return Err(TranslationError::Parse("XML文档存在未闭合的元素".to_string()));
    }
    Ok(flat)
}

/// 解码 Android 资源转义：`\'`、`\"`、`\\`、`\n`、`\t`、`\uXXXX`
fn unescape_android_value(value: &str) -> String {
    let mut decoded = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            decoded.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => decoded.push('\n'),
            Some('t') => decoded.push('\t'),
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) if hex.len() == 4 => {
                        decoded.push(ch);
                        chars.nth(3);
                    }
                    _ => decoded.push_str("\\u"),
                }
            }
            Some(next) => decoded.push(next),
            None => decoded.push('\\'),
        }
    }
    decoded
}

/// 按 aapt 要求编码 `<string>` 文本，再做最小的 XML 转义
fn android_text(value: &str) -> BytesText<'static> {
    let mut encoded = String::with_capacity(value.len() + 8);
    if value.starts_with('@') || value.starts_with('?') {
        encoded.push('\\');
    }
    for c in value.chars() {
        match c {
            '\\' => encoded.push_str("\\\\"),
            '\'' => encoded.push_str("\\'"),
            '"' => encoded.push_str("\\\""),
            '\n' => encoded.push_str("\\n"),
            '\t' => encoded.push_str("\\t"),
            _ => encoded.push(c),
        }
    }
    BytesText::from_escaped(partial_escape(&encoded).into_owned())
}

fn write_string_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    key: &str,
    text: &str,
) -> Result<()> {
    writer.write_event(Event::Start(
        BytesStart::new("string").with_attributes([("name", key)]),
    ))?;
    writer.write_event(Event::Text(android_text(text)))?;
    writer.write_event(Event::End(BytesEnd::new("string")))?;
    Ok(())
}

fn reconstruct_android_xml(flat: &FlatMap, original: Option<&str>) -> Result<String> {
    let Some(content) = original else {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("resources")))?;
        for (key, text) in flat {
            write_string_element(&mut writer, key, text)?;
        }
        writer.write_event(Event::End(BytesEnd::new("resources")))?;
        let mut xml = bytes_to_string(writer.into_inner())?;
        xml.push('\n');
        return Ok(xml);
    };

    let mut reader = Reader::from_reader(content.as_bytes());
    reader.trim_text(false);
    let mut writer = Writer::new(Vec::new());
    let mut buf = Vec::new();

    let mut used: HashSet<String> = HashSet::new();
    let mut depth = 0usize;
    // 正在替换的 string 元素内部的嵌套深度
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?.into_owned();
        buf.clear();

        if skip_depth > 0 {
            match event {
                Event::Start(_) => {
                    skip_depth += 1;
                    depth += 1;
                }
                Event::End(end) => {
                    skip_depth -= 1;
                    depth = depth.saturating_sub(1);
                    if skip_depth == 0 {
                        writer.write_event(Event::End(end))?;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Start(start) if start.name().as_ref() == b"string" => {
                depth += 1;
                let (name, translatable) = string_element_info(&start)?;
                match name.filter(|_| translatable).and_then(|n| flat.get_key_value(&n)) {
                    Some((key, text)) => {
                        used.insert(key.clone());
                        writer.write_event(Event::Start(start))?;
                        writer.write_event(Event::Text(android_text(text)))?;
                        skip_depth = 1;
                    }
                    None => writer.write_event(Event::Start(start))?,
                }
            }
            Event::Empty(start) if start.name().as_ref() == b"string" => {
                let (name, translatable) = string_element_info(&start)?;
                match name.filter(|_| translatable).and_then(|n| flat.get_key_value(&n)) {
                    Some((key, text)) if !text.is_empty() => {
                        used.insert(key.clone());
                        writer.write_event(Event::Start(start.clone()))?;
                        writer.write_event(Event::Text(android_text(text)))?;
                        writer.write_event(Event::End(start.to_end().into_owned()))?;
                    }
                    _ => writer.write_event(Event::Empty(start))?,
                }
            }
            Event::Start(start) => {
                depth += 1;
                writer.write_event(Event::Start(start))?;
            }
            Event::End(end) => {
                if depth == 1 && end.name().as_ref() == b"resources" {
                    for (key, text) in flat.iter().filter(|(k, _)| !used.contains(k.as_str())) {
                        writer.write_event(Event::Text(BytesText::from_escaped("    ")))?;
                        write_string_element(&mut writer, key, text)?;
                        writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
                    }
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(end))?;
            }
            other => writer.write_event(other)?,
        }
    }

    if depth != 0 || skip_depth != 0 {
        return Err(TranslationError::Parse("XML文档存在未闭合的元素".to_string()));
    }
    bytes_to_string(writer.into_inner())
}

fn bytes_to_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| TranslationError::Parse(format!("UTF-8转换失败: {}", e)))
}

// ---------------------------------------------------------------------------
// iOS strings
// ---------------------------------------------------------------------------

/// 注释所在的字节区间，字符串字面量中的 `//` 不算注释
fn comment_ranges(content: &str) -> Result<Vec<(usize, usize)>> {
    let regex = compile_regex(STRINGS_TOKEN_PATTERN)?;
    Ok(regex
        .captures_iter(content)
        .filter_map(|caps| caps.name("comment").map(|m| (m.start(), m.end())))
        .collect())
}

/// 不在注释中的键值对：(键, 值在原文中的区间)
fn strings_pairs(content: &str) -> Result<Vec<(String, (usize, usize), String)>> {
    let comments = comment_ranges(content)?;
    let pair_regex = compile_regex(STRINGS_PAIR_PATTERN)?;

    let mut pairs = Vec::new();
    let mut cursor = 0usize;
    while cursor < content.len() {
        let Some(caps) = pair_regex.captures_at(content, cursor) else {
            break;
        };
        let (Some(whole), Some(key), Some(value)) =
            (caps.get(0), caps.name("key"), caps.name("value"))
        else {
            break;
        };

        if let Some(&(_, comment_end)) = comments
            .iter()
            .find(|(start, end)| whole.start() >= *start && whole.start() < *end)
        {
            // 位于注释中的伪键值对，从注释末尾继续扫描
            cursor = comment_end;
            continue;
        }

        pairs.push((
            key.as_str().to_string(),
            (value.start(), value.end()),
            value.as_str().to_string(),
        ));
        cursor = whole.end();
    }
    Ok(pairs)
}

fn parse_ios_strings(content: &str) -> Result<FlatMap> {
    Ok(strings_pairs(content)?
        .into_iter()
        .map(|(key, _, value)| (key, value))
        .collect())
}

/// 转义值中未转义的双引号与换行，已有的转义序列原样保留
fn escape_strings_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                escaped.push(c);
                match chars.next() {
                    Some(next) => escaped.push(next),
                    None => escaped.push('\\'),
                }
            }
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn reconstruct_ios_strings(flat: &FlatMap, original: Option<&str>) -> Result<String> {
    let Some(content) = original else {
        let mut output = String::new();
        for (key, value) in flat {
            output.push_str(&format!(
                "\"{}\" = \"{}\";\n",
                escape_strings_value(key),
                escape_strings_value(value)
            ));
        }
        return Ok(output);
    };

    let pairs = strings_pairs(content)?;
    let known: HashSet<&str> = pairs.iter().map(|(key, _, _)| key.as_str()).collect();

    let mut output = content.to_string();
    // 逆序替换，保持前面区间的偏移有效
    for (key, (start, end), _) in pairs.iter().rev() {
        if let Some(value) = flat.get(key) {
            output.replace_range(*start..*end, &escape_strings_value(value));
        }
    }

    let mut appended = false;
    for (key, value) in flat.iter().filter(|(k, _)| !known.contains(k.as_str())) {
        if !appended && !output.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        appended = true;
        output.push_str(&format!(
            "\"{}\" = \"{}\";\n",
            escape_strings_value(key),
            escape_strings_value(value)
        ));
    }
    Ok(output)
}
