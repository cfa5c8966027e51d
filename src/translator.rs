//! 翻译服务模块
//!
//! 多翻译源按优先级回退：DeepL 优先，其后为通用HTTP翻译接口。
//! 单个翻译源失败不会中断整体流程，全部失败时返回失败结果而不是错误。

// 标准库导入
use std::sync::Arc;
use std::time::Duration;

// 第三方crate导入
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

// 本地模块导入
use crate::api_constants::{api_config, service_config};
use crate::config::TranslatorConfig;
use crate::error::{Result, TranslationError};

/// 单次翻译结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    /// 译文，失败时为 None
    pub text: Option<String>,
    /// 成功的翻译源标识
    pub provider: Option<String>,
    /// 是否成功
    pub success: bool,
    /// 失败原因
    pub error: Option<String>,
}

impl TranslationResult {
    fn succeeded(text: String, provider: &str) -> Self {
        Self {
            text: Some(text),
            provider: Some(provider.to_string()),
            success: true,
            error: None,
        }
    }

    fn failed(reason: &str) -> Self {
        Self {
            text: None,
            provider: None,
            success: false,
            error: Some(reason.to_string()),
        }
    }
}

/// 翻译源用量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    /// 已使用字符数
    pub character_count: u64,
    /// 字符上限
    pub character_limit: u64,
    /// 已使用百分比
    pub percentage_used: f64,
}

impl ProviderUsage {
    /// 根据已用量与上限构造，上限为0时百分比为0
    pub fn new(character_count: u64, character_limit: u64) -> Self {
        let percentage_used = if character_limit == 0 {
            0.0
        } else {
            (character_count as f64 / character_limit as f64 * 10000.0).round() / 100.0
        };
        Self {
            character_count,
            character_limit,
            percentage_used,
        }
    }

    /// 剩余字符数
    pub fn remaining(&self) -> u64 {
        self.character_limit.saturating_sub(self.character_count)
    }
}

/// 翻译源状态
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    /// 已配置的翻译源及其可用性（按优先级）
    pub providers: Vec<(String, bool)>,
    /// 首选翻译源，即第一个可用的翻译源
    pub primary: Option<String>,
}

/// 翻译源接口
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// 翻译源标识
    fn id(&self) -> &str;

    /// 翻译一段文本，失败时返回 None
    async fn translate_text(&self, text: &str, source_lang: &str, target_lang: &str)
        -> Option<String>;

    /// 检查翻译源是否可用
    async fn check_availability(&self) -> bool;

    /// 查询用量，不支持时返回 None
    async fn usage(&self) -> Option<ProviderUsage> {
        None
    }

    /// 转换为该翻译源使用的语言代码
    fn normalize_lang(&self, lang: &str) -> String {
        lang.to_string()
    }
}

/// DeepL 支持的目标语言
const DEEPL_LANGUAGES: &[&str] = &[
    "AR", "BG", "CS", "DA", "DE", "EL", "EN-GB", "EN-US", "ES", "ET", "FI", "FR", "HU", "ID",
    "IT", "JA", "KO", "LT", "LV", "NB", "NL", "PL", "PT-BR", "PT-PT", "RO", "RU", "SK", "SL",
    "SV", "TR", "UK", "ZH",
];

/// 将语言代码转换为 DeepL 格式
///
/// 大写化，`EN`→`EN-US`，`PT`→`PT-BR`，`ZH-CN` 等变体折叠为 `ZH`。
/// 未知代码记录警告后原样传递。
pub fn normalize_deepl_lang(lang: &str) -> String {
    let upper = lang.trim().to_ascii_uppercase();
    let normalized = match upper.as_str() {
        "EN" => "EN-US".to_string(),
        "PT" => "PT-BR".to_string(),
        code if code.starts_with("ZH") => "ZH".to_string(),
        _ => upper.clone(),
    };
    if !DEEPL_LANGUAGES.contains(&normalized.as_str()) {
        warn!("⚠️ DeepL 可能不支持语言代码: {}", lang);
    }
    normalized
}

/// 源语言转换，`auto` 表示交由 DeepL 自动检测
fn deepl_source_lang(lang: &str) -> Option<String> {
    if lang.trim().is_empty() || lang.eq_ignore_ascii_case(service_config::DEFAULT_SOURCE_LANG) {
        return None;
    }
    // 源语言不区分地区
    let upper = lang.trim().to_ascii_uppercase();
    Some(upper.split('-').next().unwrap_or(&upper).to_string())
}

/// 按重试策略执行请求
///
/// 仅可重试错误会重试，第 n 次重试前等待 n * 基数秒。
async fn with_retry<T, F, Fut>(provider: &str, max_retries: usize, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let delay = Duration::from_secs(attempt as u64 * service_config::RETRY_DELAY_BASE_SECS);
                warn!(
                    "🔄 {} 请求失败，{}秒后进行第 {} 次重试: {}",
                    provider,
                    delay.as_secs(),
                    attempt,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeepLTranslateResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
}

#[derive(Debug, Deserialize)]
struct DeepLUsageResponse {
    character_count: u64,
    character_limit: u64,
}

/// DeepL 翻译源
pub struct DeepLProvider {
    client: Client,
    api_key: String,
    base_url: String,
    max_retries: usize,
}

impl DeepLProvider {
    /// 创建 DeepL 翻译源
    pub fn new(api_key: &str, base_url: &str, timeout_secs: u64, max_retries: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    fn auth_header(&self) -> String {
        format!("DeepL-Auth-Key {}", self.api_key)
    }

    /// `target_lang` 须已转换为 DeepL 格式
    async fn request_translation(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String> {
        let mut body = json!({
            "text": [text],
            "target_lang": target_lang,
        });
        if let Some(source) = deepl_source_lang(source_lang) {
            body["source_lang"] = json!(source);
        }

        let response = self
            .client
            .post(format!("{}/v2/translate", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| crate::translation_error!(provider, api_config::DEEPL_PROVIDER_ID, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(crate::translation_error!(
                provider,
                api_config::DEEPL_PROVIDER_ID,
                format!("HTTP {}: {}", status, detail),
                status.as_u16()
            ));
        }

        let parsed: DeepLTranslateResponse = response.json().await.map_err(|e| {
            crate::translation_error!(provider, api_config::DEEPL_PROVIDER_ID, format!("响应解析失败: {}", e))
        })?;
        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| {
                crate::translation_error!(provider, api_config::DEEPL_PROVIDER_ID, "响应中没有译文")
            })
    }

    async fn request_usage(&self) -> Result<ProviderUsage> {
        let response = self
            .client
            .get(format!("{}/v2/usage", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(crate::translation_error!(
                provider,
                api_config::DEEPL_PROVIDER_ID,
                format!("用量查询失败: HTTP {}", status),
                status.as_u16()
            ));
        }
        let usage: DeepLUsageResponse = response.json().await?;
        Ok(ProviderUsage::new(usage.character_count, usage.character_limit))
    }
}

#[async_trait]
impl TranslationProvider for DeepLProvider {
    fn id(&self) -> &str {
        api_config::DEEPL_PROVIDER_ID
    }

    async fn translate_text(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Option<String> {
        let target_lang = self.normalize_lang(target_lang);
        match with_retry(self.id(), self.max_retries, || {
            self.request_translation(text, source_lang, &target_lang)
        })
        .await
        {
            Ok(translated) => Some(translated),
            Err(e) => {
                warn!("❌ DeepL 翻译失败: {}", e);
                None
            }
        }
    }

    async fn check_availability(&self) -> bool {
        self.request_usage().await.is_ok()
    }

    async fn usage(&self) -> Option<ProviderUsage> {
        match self.request_usage().await {
            Ok(usage) => Some(usage),
            Err(e) => {
                debug!("DeepL 用量查询失败: {}", e);
                None
            }
        }
    }

    fn normalize_lang(&self, lang: &str) -> String {
        normalize_deepl_lang(lang)
    }
}

/// 通用HTTP翻译源
///
/// 请求体为 `{"text", "source_lang", "target_lang"}`，
/// 译文从响应的 `data`、`text` 或 `result` 字段读取，非JSON响应按纯文本处理。
pub struct HttpApiProvider {
    client: Client,
    api_url: String,
    max_retries: usize,
}

impl HttpApiProvider {
    /// 创建通用HTTP翻译源
    pub fn new(api_url: &str, timeout_secs: u64, max_retries: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            max_retries,
        })
    }

    async fn request_translation(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&json!({
                "text": text,
                "source_lang": source_lang,
                "target_lang": target_lang
            }))
            .send()
            .await
            .map_err(|e| crate::translation_error!(provider, api_config::HTTP_PROVIDER_ID, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(crate::translation_error!(
                provider,
                api_config::HTTP_PROVIDER_ID,
                format!("翻译API返回错误状态: {}", status),
                status.as_u16()
            ));
        }

        let response_text = response.text().await?;
        let translated = extract_translated_text(&response_text);
        if translated.trim().is_empty() {
            return Err(crate::translation_error!(
                provider,
                api_config::HTTP_PROVIDER_ID,
                "翻译API返回空结果"
            ));
        }
        Ok(translated)
    }
}

/// 从通用接口响应中取出译文
fn extract_translated_text(response_text: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(response_text) {
        Ok(json_val) => json_val
            .get("data")
            .or_else(|| json_val.get("text"))
            .or_else(|| json_val.get("result"))
            .and_then(|v| v.as_str())
            .unwrap_or(response_text)
            .to_string(),
        Err(_) => response_text.to_string(),
    }
}

#[async_trait]
impl TranslationProvider for HttpApiProvider {
    fn id(&self) -> &str {
        api_config::HTTP_PROVIDER_ID
    }

    async fn translate_text(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Option<String> {
        let target_lang = self.normalize_lang(target_lang);
        match with_retry(self.id(), self.max_retries, || {
            self.request_translation(text, source_lang, &target_lang)
        })
        .await
        {
            Ok(translated) => Some(translated),
            Err(e) => {
                warn!("❌ HTTP翻译接口失败: {}", e);
                None
            }
        }
    }

    async fn check_availability(&self) -> bool {
        self.request_translation("hello", "en", "zh").await.is_ok()
    }
}

/// 翻译服务
///
/// 持有按优先级排列的翻译源，初始化后只读，可在多个任务之间共享。
pub struct TranslationService {
    providers: Vec<Arc<dyn TranslationProvider>>,
    max_concurrency: usize,
}

impl TranslationService {
    /// 使用指定翻译源创建服务
    pub fn new(providers: Vec<Arc<dyn TranslationProvider>>, max_concurrency: usize) -> Self {
        Self {
            providers,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// 根据配置创建服务
    pub fn from_config(config: &TranslatorConfig) -> Result<Self> {
        config.validate()?;

        let mut providers: Vec<Arc<dyn TranslationProvider>> = Vec::new();
        if let (Some(key), Some(url)) = (config.deepl_api_key(), config.deepl_api_url()) {
            providers.push(Arc::new(DeepLProvider::new(
                key,
                url,
                config.timeout_secs(),
                config.max_retries(),
            )?));
        }
        if let Some(url) = config.http_api_url() {
            providers.push(Arc::new(HttpApiProvider::new(
                url,
                config.timeout_secs(),
                config.max_retries(),
            )?));
        }

        if providers.is_empty() {
            return Err(TranslationError::Configuration {
                field: "providers".to_string(),
                reason: "未配置任何翻译源".to_string(),
            });
        }

        info!(
            "🔧 翻译源: {}",
            providers.iter().map(|p| p.id()).collect::<Vec<_>>().join(" → ")
        );
        Ok(Self::new(providers, config.max_concurrency()))
    }

    /// 翻译源数量
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// 翻译单段文本
    ///
    /// 空白文本直接返回失败，不调用任何翻译源；否则按优先级依次尝试。
    pub async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> TranslationResult {
        if text.trim().is_empty() {
            return TranslationResult::failed(service_config::EMPTY_TEXT);
        }

        for provider in &self.providers {
            if let Some(translated) = provider.translate_text(text, source_lang, target_lang).await {
                debug!("✅ {} 翻译成功 ({} 字符)", provider.id(), text.chars().count());
                return TranslationResult::succeeded(translated, provider.id());
            }
            warn!("⚠️ 翻译源 {} 失败，尝试下一个", provider.id());
        }

        TranslationResult::failed(service_config::ALL_PROVIDERS_FAILED)
    }

    /// 批量翻译，结果顺序与输入一致
    pub async fn translate_batch(
        &self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Vec<TranslationResult> {
        let requests = texts.iter().cloned().map(|text| async move {
            self.translate(&text, source_lang, target_lang).await
        });
        stream::iter(requests)
            .buffered(self.max_concurrency)
            .collect()
            .await
    }

    /// 查询翻译源状态
    pub async fn status(&self) -> ProviderStatus {
        let mut providers = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let available = provider.check_availability().await;
            providers.push((provider.id().to_string(), available));
        }
        let primary = providers
            .iter()
            .find(|(_, available)| *available)
            .map(|(id, _)| id.clone());
        ProviderStatus { providers, primary }
    }

    /// 查询首选翻译源用量，首选规则与 `status` 相同
    pub async fn usage(&self) -> Option<ProviderUsage> {
        for provider in &self.providers {
            if provider.check_availability().await {
                return provider.usage().await;
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 按词典翻译的测试翻译源，未命中的文本返回 `[lang] text`
    pub(crate) struct MockProvider {
        pub id: String,
        pub healthy: bool,
        pub dictionary: HashMap<String, String>,
        pub calls: AtomicUsize,
        pub usage: ProviderUsage,
    }

    impl MockProvider {
        pub fn new(id: &str, healthy: bool) -> Self {
            Self {
                id: id.to_string(),
                healthy,
                dictionary: HashMap::new(),
                calls: AtomicUsize::new(0),
                usage: ProviderUsage::new(100, 500_000),
            }
        }

        pub fn with_usage(mut self, usage: ProviderUsage) -> Self {
            self.usage = usage;
            self
        }

        pub fn with_entry(mut self, from: &str, to: &str) -> Self {
            self.dictionary.insert(from.to_string(), to.to_string());
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranslationProvider for MockProvider {
        fn id(&self) -> &str {
            &self.id
        }

        async fn translate_text(&self, text: &str, _source: &str, target: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.healthy {
                return None;
            }
            Some(
                self.dictionary
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| format!("[{}] {}", target, text)),
            )
        }

        async fn check_availability(&self) -> bool {
            self.healthy
        }

        async fn usage(&self) -> Option<ProviderUsage> {
            Some(self.usage.clone())
        }
    }

    fn service(providers: Vec<Arc<MockProvider>>) -> TranslationService {
        TranslationService::new(
            providers
                .into_iter()
                .map(|p| p as Arc<dyn TranslationProvider>)
                .collect(),
            1,
        )
    }

    #[tokio::test]
    async fn test_primary_provider_success() {
        let primary = Arc::new(MockProvider::new("primary", true).with_entry("Hello", "Hola"));
        let secondary = Arc::new(MockProvider::new("secondary", true));
        let service = service(vec![primary.clone(), secondary.clone()]);

        let result = service.translate("Hello", "en", "es").await;
        assert!(result.success);
        assert_eq!(result.text.as_deref(), Some("Hola"));
        assert_eq!(result.provider.as_deref(), Some("primary"));
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fallback_to_secondary_provider() {
        let primary = Arc::new(MockProvider::new("primary", false));
        let secondary = Arc::new(MockProvider::new("secondary", true).with_entry("Hello", "Bonjour"));
        let service = service(vec![primary.clone(), secondary.clone()]);

        let result = service.translate("Hello", "en", "fr").await;
        assert!(result.success);
        assert_eq!(result.text.as_deref(), Some("Bonjour"));
        assert_eq!(result.provider.as_deref(), Some("secondary"));
        assert_eq!(primary.call_count(), 1);
    }

    #[tokio::test]
    async fn test_all_providers_failed() {
        let service = service(vec![
            Arc::new(MockProvider::new("a", false)),
            Arc::new(MockProvider::new("b", false)),
        ]);

        let result = service.translate("Hello", "en", "fr").await;
        assert!(!result.success);
        assert_eq!(result.text, None);
        assert_eq!(result.provider, None);
        assert_eq!(result.error.as_deref(), Some(service_config::ALL_PROVIDERS_FAILED));
    }

    #[tokio::test]
    async fn test_empty_text_skips_providers() {
        let provider = Arc::new(MockProvider::new("a", true));
        let service = service(vec![provider.clone()]);

        let result = service.translate("   \n", "en", "fr").await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(service_config::EMPTY_TEXT));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_with_concurrency() {
        let provider = Arc::new(MockProvider::new("a", true));
        let service = TranslationService::new(vec![provider as Arc<dyn TranslationProvider>], 4);
        let texts: Vec<String> = (0..12).map(|i| format!("text {}", i)).collect();

        let results = service.translate_batch(&texts, "en", "de").await;
        assert_eq!(results.len(), 12);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.text, Some(format!("[de] text {}", i)));
        }
    }

    #[tokio::test]
    async fn test_status_and_usage() {
        let service = service(vec![
            Arc::new(MockProvider::new("down", false).with_usage(ProviderUsage::new(9, 10))),
            Arc::new(MockProvider::new("up", true)),
        ]);

        let status = service.status().await;
        assert_eq!(
            status.providers,
            vec![("down".to_string(), false), ("up".to_string(), true)]
        );
        assert_eq!(status.primary.as_deref(), Some("up"));

        let usage = service.usage().await.unwrap();
        assert_eq!(usage.remaining(), 499_900);
        assert_eq!(usage.percentage_used, 0.02);
    }

    #[test]
    fn test_normalize_deepl_lang() {
        assert_eq!(normalize_deepl_lang("en"), "EN-US");
        assert_eq!(normalize_deepl_lang("pt"), "PT-BR");
        assert_eq!(normalize_deepl_lang("zh-CN"), "ZH");
        assert_eq!(normalize_deepl_lang("de"), "DE");
        assert_eq!(normalize_deepl_lang("xx"), "XX");
        assert_eq!(deepl_source_lang("auto"), None);
        assert_eq!(deepl_source_lang("en-GB").as_deref(), Some("EN"));
    }

    #[tokio::test]
    async fn test_usage_is_none_without_available_provider() {
        let service = service(vec![Arc::new(MockProvider::new("down", false))]);
        assert_eq!(service.usage().await, None);
    }

    #[test]
    fn test_provider_language_codes() {
        let deepl = DeepLProvider::new("key:fx", "https://api-free.deepl.com", 5, 0).unwrap();
        assert_eq!(deepl.normalize_lang("en"), "EN-US");
        assert_eq!(deepl.normalize_lang("zh-TW"), "ZH");

        let http = HttpApiProvider::new("http://localhost:1188/translate", 5, 0).unwrap();
        assert_eq!(http.normalize_lang("zh-TW"), "zh-TW");
    }

    #[test]
    fn test_extract_translated_text() {
        assert_eq!(extract_translated_text(r#"{"data":"你好"}"#), "你好");
        assert_eq!(extract_translated_text(r#"{"result":"hola"}"#), "hola");
        assert_eq!(extract_translated_text("plain"), "plain");
    }

    #[tokio::test]
    async fn test_retry_only_retryable_errors() {
        let attempts = AtomicUsize::new(0);
        let result: Result<()> = with_retry("test", 3, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(crate::translation_error!(provider, "test", "bad request", 400)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_service_from_config_requires_provider() {
        assert!(TranslationService::from_config(&TranslatorConfig::new()).is_err());
        let service = TranslationService::from_config(
            &TranslatorConfig::new()
                .with_deepl_key("k:fx")
                .with_http_api_url("http://localhost:1188/translate"),
        )
        .unwrap();
        assert_eq!(service.provider_count(), 2);
    }
}
