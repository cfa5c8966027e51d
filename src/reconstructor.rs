//! HTML重建模块
//!
//! 将译文写回原始页面的对应节点，并把整站页面打包为zip归档。

// 标准库导入
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};

// 第三方crate导入
use html5ever::tendril::StrTendril;
use markup5ever_rcdom::{NodeData, RcDom};
use quick_xml::escape::escape;
use tracing::{debug, warn};
use url::Url;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

// 本地模块导入
use crate::error::Result;
use crate::html_processor::{
    append_child, create_element, find_by_tag_and_attributes, find_first_element, get_node_attr,
    parse_html, resolve_locator, serialize_dom_to_html, set_node_attr, ElementTarget, LocatedNode,
    TranslatableElement,
};
use crate::web_crawler::{unique_url_path, PageRecord};

/// 重建单个页面
///
/// 任何内部错误都会记录日志并返回原始HTML。
pub fn reconstruct_page(
    original_html: &str,
    elements: &[TranslatableElement],
    target_lang: &str,
) -> String {
    match try_reconstruct_page(original_html, elements, target_lang) {
        Ok(html) => html,
        Err(e) => {
            warn!("⚠️ 页面重建失败，保留原文: {}", e);
            original_html.to_string()
        }
    }
}

fn try_reconstruct_page(
    original_html: &str,
    elements: &[TranslatableElement],
    target_lang: &str,
) -> Result<String> {
    let dom = parse_html(original_html)?;

    if let Some(html) = find_first_element(&dom.document, "html") {
        set_node_attr(&html, "lang", target_lang);
    }

    let mut applied = 0usize;
    for element in elements {
        let Some(translated) = element.translated_text.as_deref() else {
            continue;
        };
        match locate(&dom, element) {
            Some(node) => {
                apply_translation(&node, translated);
                applied += 1;
            }
            None => debug!("未找到元素节点: {}", element.locator),
        }
    }

    if let Some(head) = find_first_element(&dom.document, "head") {
        let href = format!("/{}/", target_lang);
        let link = create_element(
            "link",
            &[("rel", "alternate"), ("hreflang", target_lang), ("href", &href)],
        );
        append_child(&head, link);
    }

    debug!("写回 {} / {} 个译文", applied, elements.len());
    serialize_dom_to_html(&dom)
}

/// 先按定位符查找并校验原文，失败时按标签与属性回退匹配
fn locate(dom: &RcDom, element: &TranslatableElement) -> Option<LocatedNode> {
    let by_locator = resolve_locator(dom, &element.locator).filter(|node| matches_original(node, element));
    by_locator.or_else(|| find_by_tag_and_attributes(dom, element))
}

fn matches_original(node: &LocatedNode, element: &TranslatableElement) -> bool {
    match (node, element.target()) {
        (LocatedNode::Text(handle), ElementTarget::TextNode) => match &handle.data {
            NodeData::Text { contents } => contents.borrow().trim() == element.text,
            _ => false,
        },
        (LocatedNode::Attribute(handle, attr), ElementTarget::Attribute(expected)) => {
            *attr == expected
                && get_node_attr(handle, attr)
                    .map(|value| value.trim() == element.text)
                    .unwrap_or(false)
        }
        _ => false,
    }
}

/// 写入译文，文本节点保留原有的首尾空白
fn apply_translation(node: &LocatedNode, translated: &str) {
    match node {
        LocatedNode::Text(handle) => {
            if let NodeData::Text { contents } = &handle.data {
                let mut contents = contents.borrow_mut();
                let original = contents.to_string();
                let leading = &original[..original.len() - original.trim_start().len()];
                let trailing = &original[original.trim_end().len()..];
                *contents = StrTendril::from(format!("{}{}{}", leading, translated, trailing));
            }
        }
        LocatedNode::Attribute(handle, attr) => set_node_attr(handle, attr, translated),
    }
}

/// 各页面的归档条目名，重复的 `url_path` 追加序号
fn entry_names(pages: &[PageRecord]) -> Vec<String> {
    let mut assigned = HashSet::new();
    pages
        .iter()
        .map(|page| unique_url_path(page.url_path.clone(), &mut assigned))
        .collect()
}

/// 打包整站归档
///
/// 每个页面一个压缩条目，按发现顺序写入 `url_path`，时间戳固定以保证输出可复现。
/// 条目名在归档内唯一。
pub fn build_site(
    pages: &[PageRecord],
    elements: &[TranslatableElement],
    target_lang: &str,
) -> Result<Vec<u8>> {
    let mut by_page: HashMap<&str, Vec<TranslatableElement>> = HashMap::new();
    for element in elements {
        by_page
            .entry(element.page_url.as_str())
            .or_default()
            .push(element.clone());
    }

    let entries: Vec<(String, String)> = pages
        .iter()
        .zip(entry_names(pages))
        .map(|(page, name)| {
            let page_elements = by_page.get(page.url.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            let html = reconstruct_page(&page.raw_html, page_elements, target_lang);
            (name, html)
        })
        .collect();

    write_archive(&entries)
}

/// 按给定顺序写出zip归档，条目路径使用正斜杠
pub fn write_archive(entries: &[(String, String)]) -> Result<Vec<u8>> {
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, content) in entries {
        writer.start_file(name.as_str(), options)?;
        writer.write_all(content.as_bytes())?;
        debug!("📦 已写入归档条目: {}", name);
    }

    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

/// 生成带 hreflang 备用链接的 sitemap.xml
///
/// 每个页面输出一个 `{origin}/{lang}/{url_path}` 地址，
/// 并为 `alternates` 中每种语言及原始页面（x-default）添加 `xhtml:link`。
pub fn generate_sitemap(
    pages: &[PageRecord],
    base_url: &str,
    target_lang: &str,
    alternates: &[String],
) -> String {
    let origin = Url::parse(base_url)
        .map(|url| url.origin().ascii_serialization())
        .unwrap_or_else(|_| base_url.trim_end_matches('/').to_string());

    let mut languages: Vec<&str> = vec![target_lang];
    for lang in alternates {
        if !languages.contains(&lang.as_str()) {
            languages.push(lang);
        }
    }

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\" \
         xmlns:xhtml=\"http://www.w3.org/1999/xhtml\">\n",
    );
    for (page, url_path) in pages.iter().zip(entry_names(pages)) {
        let loc = format!("{}/{}/{}", origin, target_lang, url_path);
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape(&loc)));
        for lang in &languages {
            let href = format!("{}/{}/{}", origin, lang, url_path);
            xml.push_str(&format!(
                "    <xhtml:link rel=\"alternate\" hreflang=\"{}\" href=\"{}\"/>\n",
                escape(*lang),
                escape(&href)
            ));
        }
        xml.push_str(&format!(
            "    <xhtml:link rel=\"alternate\" hreflang=\"x-default\" href=\"{}\"/>\n",
            escape(&page.url)
        ));
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}
