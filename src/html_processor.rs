//! HTML处理模块
//!
//! 此模块负责：
//! - HTML解析与序列化
//! - 提取页面可见文本、标题、描述与链接
//! - 提取可翻译元素并为每个元素记录结构定位符
//! - 根据定位符在重新解析的文档中找回同一节点

// 标准库导入
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

// 第三方crate导入
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, Attribute, LocalName, Namespace, QualName};
use indexmap::IndexMap;
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};
use serde::{Deserialize, Serialize};

// 本地模块导入
use crate::api_constants::crawler_config::{INVISIBLE_TAGS, TRANSLATABLE_TAGS};
use crate::error::{Result, TranslationError};
use crate::utils::{count_words, is_translatable_text};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// 可翻译元素
///
/// 每个被提取的文本节点、图片 alt、`<title>` 文本或页面描述对应一个元素。
/// 由提取阶段创建，编排器写入译文，重建器消费。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatableElement {
    /// 所属页面（规范化URL）
    pub page_url: String,
    /// 承载文本的标签名
    pub tag_name: String,
    /// 原文（去除首尾空白）
    pub text: String,
    /// 承载标签的原始属性，定位失败时用于重新匹配
    pub attributes: IndexMap<String, String>,
    /// 结构定位符，例如 `/html[1]/body[1]/p[2]/text()[1]` 或 `/html[1]/body[1]/img[1]/@alt`
    pub locator: String,
    /// 译文，翻译失败时为空，重建时保留原文
    pub translated_text: Option<String>,
    /// 产出译文的翻译源
    pub provider: Option<String>,
}

/// 定位符指向的目标类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementTarget {
    /// 元素的直接文本节点
    TextNode,
    /// 元素属性
    Attribute(String),
}

impl TranslatableElement {
    /// 定位符指向的目标类型
    pub fn target(&self) -> ElementTarget {
        match self.locator.rsplit_once("/@") {
            Some((_, attr)) => ElementTarget::Attribute(attr.to_string()),
            None => ElementTarget::TextNode,
        }
    }
}

/// 单个页面的提取结果
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    /// 拼接后的可见文本
    pub extracted_text: String,
    /// 可见文本词数
    pub word_count: usize,
    /// `<title>` 文本
    pub title: Option<String>,
    /// `<meta name="description">` 内容
    pub meta_description: Option<String>,
    /// `<a href>` 原始值，按文档顺序
    pub links: Vec<String>,
    /// 可翻译元素，按文档顺序
    pub elements: Vec<TranslatableElement>,
}

/// 定位符解析结果
#[derive(Debug, Clone)]
pub enum LocatedNode {
    /// 文本节点
    Text(Handle),
    /// 元素节点及属性名
    Attribute(Handle, String),
}

/// 解析HTML为DOM
pub fn parse_html(html: &str) -> Result<RcDom> {
    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|e| TranslationError::Parse(format!("HTML解析失败: {}", e)))
}

/// 序列化DOM为HTML字符串
pub fn serialize_dom_to_html(dom: &RcDom) -> Result<String> {
    use html5ever::serialize::{serialize, SerializeOpts};
    use markup5ever_rcdom::SerializableHandle;
    use std::io::Cursor;

    let mut buffer = Vec::new();
    let cursor = Cursor::new(&mut buffer);

    serialize(
        cursor,
        &SerializableHandle::from(dom.document.clone()),
        SerializeOpts::default(),
    )
    .map_err(|e| TranslationError::Reconstruction(format!("HTML序列化失败: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| TranslationError::Reconstruction(format!("UTF-8转换失败: {}", e)))
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| attr.name.local.as_ref() == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 设置节点属性，不存在时追加
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let mut attrs = attrs.borrow_mut();
        match attrs
            .iter()
            .position(|attr| attr.name.local.as_ref() == attr_name)
        {
            Some(index) => attrs[index].value = StrTendril::from(attr_value),
            None => attrs.push(Attribute {
                name: QualName::new(None, Namespace::from(""), LocalName::from(attr_name)),
                value: StrTendril::from(attr_value),
            }),
        }
    }
}

/// 节点属性表
pub fn node_attributes(node: &Handle) -> IndexMap<String, String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect(),
        _ => IndexMap::new(),
    }
}

/// 广度优先查找第一个指定名称的元素
pub fn find_first_element(root: &Handle, tag: &str) -> Option<Handle> {
    let mut queue = VecDeque::new();
    queue.push_back(root.clone());

    while let Some(node) = queue.pop_front() {
        if get_node_name(&node) == Some(tag) {
            return Some(node);
        }
        for child in node.children.borrow().iter() {
            queue.push_back(child.clone());
        }
    }
    None
}

/// 创建HTML命名空间下的新元素
pub fn create_element(tag: &str, attributes: &[(&str, &str)]) -> Handle {
    let attrs = attributes
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, Namespace::from(""), LocalName::from(*name)),
            value: StrTendril::from(*value),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, Namespace::from(HTML_NAMESPACE), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 追加子节点
pub fn append_child(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// 提取页面的可见文本、元数据、链接与可翻译元素
pub fn extract_page(dom: &RcDom, page_url: &str) -> PageContent {
    let mut content = PageContent::default();
    let mut visible: Vec<String> = Vec::new();

    walk(&dom.document, "", false, page_url, &mut content, &mut visible);

    content.extracted_text = visible.join(" ");
    content.word_count = count_words(&content.extracted_text);
    content
}

/// 深度优先遍历，按文档顺序记录元素。每一步都带同名兄弟序号，定位符在文档内唯一
fn walk(
    node: &Handle,
    path: &str,
    invisible: bool,
    page_url: &str,
    content: &mut PageContent,
    visible: &mut Vec<String>,
) {
    let parent_tag = get_node_name(node).unwrap_or("");
    let mut tag_counts: HashMap<String, usize> = HashMap::new();
    let mut text_count = 0usize;

    for child in node.children.borrow().iter() {
        match &child.data {
            NodeData::Element { name, .. } => {
                let tag = name.local.as_ref();
                let index = tag_counts.entry(tag.to_string()).or_insert(0);
                *index += 1;
                let child_path = format!("{}/{}[{}]", path, tag, index);
                let child_invisible = invisible || INVISIBLE_TAGS.contains(&tag);

                if !child_invisible {
                    collect_attribute_elements(child, tag, &child_path, page_url, content);
                }
                walk(child, &child_path, child_invisible, page_url, content, visible);
            }
            NodeData::Text { contents } => {
                text_count += 1;
                if invisible {
                    continue;
                }
                let text = contents.borrow().to_string();
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                visible.push(trimmed.to_string());

                let locator = format!("{}/text()[{}]", path, text_count);
                if parent_tag == "title" {
                    if content.title.is_none() {
                        content.title = Some(trimmed.to_string());
                        content.elements.push(new_element(page_url, node, trimmed, locator));
                    }
                } else if TRANSLATABLE_TAGS.contains(&parent_tag) && is_translatable_text(trimmed) {
                    content.elements.push(new_element(page_url, node, trimmed, locator));
                }
            }
            _ => {}
        }
    }
}

fn collect_attribute_elements(
    node: &Handle,
    tag: &str,
    path: &str,
    page_url: &str,
    content: &mut PageContent,
) {
    match tag {
        "a" => {
            if let Some(href) = get_node_attr(node, "href") {
                content.links.push(href);
            }
        }
        "img" => {
            if let Some(alt) = get_node_attr(node, "alt") {
                let alt = alt.trim();
                if !alt.is_empty() {
                    let locator = format!("{}/@alt", path);
                    content.elements.push(new_element(page_url, node, alt, locator));
                }
            }
        }
        "meta" => {
            let is_description = get_node_attr(node, "name")
                .map(|name| name.eq_ignore_ascii_case("description"))
                .unwrap_or(false);
            if is_description && content.meta_description.is_none() {
                if let Some(description) = get_node_attr(node, "content") {
                    let description = description.trim();
                    if !description.is_empty() {
                        content.meta_description = Some(description.to_string());
                        let locator = format!("{}/@content", path);
                        content
                            .elements
                            .push(new_element(page_url, node, description, locator));
                    }
                }
            }
        }
        _ => {}
    }
}

fn new_element(page_url: &str, owner: &Handle, text: &str, locator: String) -> TranslatableElement {
    TranslatableElement {
        page_url: page_url.to_string(),
        tag_name: get_node_name(owner).unwrap_or("").to_string(),
        text: text.to_string(),
        attributes: node_attributes(owner),
        locator,
        translated_text: None,
        provider: None,
    }
}

/// 解析定位符的一步，例如 `p[2]` → ("p", 2)
fn parse_step(step: &str) -> Option<(&str, usize)> {
    let (name, rest) = step.split_once('[')?;
    let index = rest.strip_suffix(']')?.parse::<usize>().ok()?;
    (index > 0).then_some((name, index))
}

/// 在文档中根据定位符找回节点
pub fn resolve_locator(dom: &RcDom, locator: &str) -> Option<LocatedNode> {
    let steps: Vec<&str> = locator.split('/').filter(|s| !s.is_empty()).collect();
    let mut current = dom.document.clone();

    for (i, step) in steps.iter().enumerate() {
        let last = i + 1 == steps.len();

        if let Some(attr) = step.strip_prefix('@') {
            return last.then(|| LocatedNode::Attribute(current.clone(), attr.to_string()));
        }

        let (name, index) = parse_step(step)?;
        if name == "text()" {
            if !last {
                return None;
            }
            let text_node = current
                .children
                .borrow()
                .iter()
                .filter(|child| matches!(child.data, NodeData::Text { .. }))
                .nth(index - 1)
                .cloned()?;
            return Some(LocatedNode::Text(text_node));
        }

        let next = current
            .children
            .borrow()
            .iter()
            .filter(|child| get_node_name(child) == Some(name))
            .nth(index - 1)
            .cloned()?;
        current = next;
    }
    None
}

/// 定位失败时的回退匹配：相同标签与属性的第一个元素，
/// 文本节点比较去除空白后的原文，图片比较 alt
pub fn find_by_tag_and_attributes(dom: &RcDom, element: &TranslatableElement) -> Option<LocatedNode> {
    let attribute_target = match element.target() {
        ElementTarget::Attribute(attr) => Some(attr),
        ElementTarget::TextNode => None,
    };

    let mut queue = VecDeque::new();
    queue.push_back(dom.document.clone());

    while let Some(node) = queue.pop_front() {
        if get_node_name(&node) == Some(element.tag_name.as_str()) {
            match &attribute_target {
                Some(attr) => {
                    if get_node_attr(&node, attr).map(|v| v.trim().to_string()).as_deref()
                        == Some(element.text.as_str())
                    {
                        return Some(LocatedNode::Attribute(node.clone(), attr.clone()));
                    }
                }
                None => {
                    if node_attributes(&node) == element.attributes {
                        let text_node = node.children.borrow().iter().find(|child| {
                            matches!(&child.data, NodeData::Text { contents }
                                if contents.borrow().trim() == element.text)
                        }).cloned();
                        if let Some(text_node) = text_node {
                            return Some(LocatedNode::Text(text_node));
                        }
                    }
                }
            }
        }
        for child in node.children.borrow().iter() {
            queue.push_back(child.clone());
        }
    }
    None
}
