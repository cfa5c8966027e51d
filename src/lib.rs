//! Site Translator - 整站与本地化文件翻译工具库
//!
//! 这个库提供了网站爬取、可翻译文本提取、占位符保护、多翻译源回退翻译、
//! HTML重建与归档打包，以及本地化资源文件的解析与重建等核心功能。

pub mod api_constants;
pub mod config;
pub mod error;
pub mod html_processor;
pub mod localization;
pub mod orchestrator;
pub mod placeholder;
pub mod reconstructor;
pub mod stats;
pub mod storage;
pub mod translator;
pub mod utils;
pub mod web_crawler;
