//! 翻译任务编排模块
//!
//! 此模块负责驱动一个整站翻译任务：
//! - 校验任务、爬取站点、提取可翻译元素
//! - 占位符保护后逐块翻译，失败的元素保留原文
//! - 重建页面、打包归档并写入对象存储
//! - 通过 `ProgressReporter` 单调地上报进度，支持协作式取消
//!
//! 另提供本地化资源文件的翻译入口与基于 mpsc 通道的任务工作者。

// 标准库导入
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

// 第三方crate导入
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

// 本地模块导入
use crate::api_constants::{self, crawler_config, progress_config, storage_config};
use crate::error::{Result, TranslationError};
use crate::html_processor::TranslatableElement;
use crate::localization::{self, FileFormat, FlatMap};
use crate::placeholder::{PlaceholderProtector, PlaceholderStats};
use crate::reconstructor::{build_site, generate_sitemap, write_archive};
use crate::stats::{JobReport, ResourceStatistics};
use crate::storage::ObjectStorage;
use crate::translator::TranslationService;
use crate::utils::count_words;
use crate::web_crawler::WebCrawler;

/// 整站翻译任务描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: String,
    pub url: String,
    pub source_lang: String,
    pub target_lang: String,
    pub page_limit: usize,
}

impl JobDescriptor {
    /// 创建任务，自动生成任务ID，页面上限默认50
    pub fn new(url: &str, source_lang: &str, target_lang: &str) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            page_limit: crawler_config::DEFAULT_PAGE_LIMIT,
        }
    }

    pub fn with_job_id(mut self, job_id: &str) -> Self {
        self.job_id = job_id.to_string();
        self
    }

    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit;
        self
    }

    /// 校验URL、语言代码与页面上限
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url).map_err(|e| {
            crate::translation_error!(input_validation, &self.url, format!("URL格式错误: {}", e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(crate::translation_error!(
                input_validation,
                &self.url,
                "URL必须以http://或https://开头"
            ));
        }
        for lang in [&self.source_lang, &self.target_lang] {
            if !api_constants::is_valid_language_code(lang) {
                return Err(crate::translation_error!(
                    input_validation,
                    lang,
                    "语言代码必须为2-5个字母"
                ));
            }
        }
        if self.page_limit == 0 {
            return Err(crate::translation_error!(
                input_validation,
                self.page_limit,
                "页面上限至少为1"
            ));
        }
        Ok(())
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// 是否为终止状态
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            _ => 2,
        }
    }
}

/// 进度更新，可选字段为 None 表示不变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobUpdate {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub pages_total: Option<usize>,
    pub pages_translated: Option<usize>,
    pub words_total: Option<usize>,
    pub words_translated: Option<usize>,
    pub message: Option<String>,
    pub error_message: Option<String>,
    pub result_location: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobUpdate {
    pub fn new(job_id: &str, status: JobStatus, progress: u8) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            progress: progress.min(progress_config::COMPLETED),
            pages_total: None,
            pages_translated: None,
            words_total: None,
            words_translated: None,
            message: None,
            error_message: None,
            result_location: None,
            updated_at: Utc::now(),
        }
    }

    pub fn pages_total(mut self, count: usize) -> Self {
        self.pages_total = Some(count);
        self
    }

    pub fn pages_translated(mut self, count: usize) -> Self {
        self.pages_translated = Some(count);
        self
    }

    pub fn words_total(mut self, count: usize) -> Self {
        self.words_total = Some(count);
        self
    }

    pub fn words_translated(mut self, count: usize) -> Self {
        self.words_translated = Some(count);
        self
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn error_message(mut self, message: &str) -> Self {
        self.error_message = Some(message.to_string());
        self
    }

    pub fn result_location(mut self, location: &str) -> Self {
        self.result_location = Some(location.to_string());
        self
    }
}

/// 进度接收端
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// 接收一次进度更新
    async fn update(&self, update: JobUpdate) -> Result<()>;

    /// 任务是否已被外部取消
    async fn is_cancelled(&self, _job_id: &str) -> bool {
        false
    }
}

/// 将进度写入日志的接收端，命令行默认使用
#[derive(Debug, Default)]
pub struct TracingProgressSink;

#[async_trait]
impl ProgressSink for TracingProgressSink {
    async fn update(&self, update: JobUpdate) -> Result<()> {
        match (&update.error_message, &update.message) {
            (Some(reason), _) => error!("❌ [{}] {:?} {}%: {}", update.job_id, update.status, update.progress, reason),
            (None, Some(message)) => info!("⏳ [{}] {}% {}", update.job_id, update.progress, message),
            (None, None) => debug!("[{}] {:?} {}%", update.job_id, update.status, update.progress),
        }
        Ok(())
    }
}

/// 进度上报器
///
/// 进度只增不减，终止状态之后不再改变状态。上报失败只记录警告。
pub struct ProgressReporter<'a> {
    job_id: String,
    sink: &'a dyn ProgressSink,
    progress: u8,
    status: JobStatus,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(job_id: &str, sink: &'a dyn ProgressSink) -> Self {
        Self {
            job_id: job_id.to_string(),
            sink,
            progress: 0,
            status: JobStatus::Pending,
        }
    }

    /// 当前进度
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// 当前状态
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// 新建一条基于当前任务的更新
    pub fn at(&self, status: JobStatus, progress: u8) -> JobUpdate {
        JobUpdate::new(&self.job_id, status, progress)
    }

    /// 上报进度
    pub async fn report(&mut self, mut update: JobUpdate) {
        if self.status.is_terminal() {
            debug!("任务 {} 已结束，忽略进度更新", self.job_id);
            return;
        }
        if update.status.rank() < self.status.rank() {
            update.status = self.status;
        }
        update.progress = update.progress.max(self.progress);

        self.status = update.status;
        self.progress = update.progress;

        if let Err(e) = self.sink.update(update).await {
            warn!("⚠️ 进度上报失败: {}", e);
        }
    }

    /// 以失败状态结束任务
    pub async fn fail(&mut self, message: &str) {
        let update = self
            .at(JobStatus::Failed, self.progress)
            .error_message(message)
            .message(message);
        self.report(update).await;
    }
}

/// 编排器配置
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 每翻译多少个元素上报一次进度并检查取消
    pub report_interval: usize,
    /// 设置后额外存储 sitemap.xml，列出的语言作为 hreflang 备用链接
    pub sitemap_alternates: Option<Vec<String>>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            report_interval: progress_config::DEFAULT_REPORT_INTERVAL,
            sitemap_alternates: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn report_interval(mut self, interval: usize) -> Self {
        self.report_interval = interval.max(1);
        self
    }

    pub fn sitemap(mut self, alternates: Vec<String>) -> Self {
        self.sitemap_alternates = Some(alternates);
        self
    }
}

/// 整站翻译编排器
pub struct TranslationOrchestrator {
    crawler: WebCrawler,
    translator: Arc<TranslationService>,
    storage: Arc<dyn ObjectStorage>,
    protector: PlaceholderProtector,
    config: OrchestratorConfig,
}

impl TranslationOrchestrator {
    pub fn new(
        crawler: WebCrawler,
        translator: Arc<TranslationService>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            crawler,
            translator,
            storage,
            protector: PlaceholderProtector::new(),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// 执行一个任务
    ///
    /// 成功返回统计报告；失败时已向接收端上报 failed；取消时不再上报并返回 `Cancelled`。
    pub async fn run(&self, job: &JobDescriptor, sink: &dyn ProgressSink) -> Result<JobReport> {
        let mut reporter = ProgressReporter::new(&job.job_id, sink);
        info!("🚀 开始任务 {}: {} → {}", job.job_id, job.url, job.target_lang);

        let outcome = match job.validate() {
            Ok(()) => self.execute(job, sink, &mut reporter).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(report) => {
                info!("✅ 任务 {} 完成", job.job_id);
                Ok(report)
            }
            Err(TranslationError::Cancelled(reason)) => {
                info!("🛑 任务 {} 已取消", job.job_id);
                Err(TranslationError::Cancelled(reason))
            }
            Err(e) => {
                let failure = TranslationError::Job(e.user_message());
                error!("❌ 任务 {} 失败: {}", job.job_id, e);
                reporter.fail(&failure.to_string()).await;
                Err(failure)
            }
        }
    }

    async fn check_cancelled(&self, job: &JobDescriptor, sink: &dyn ProgressSink) -> Result<()> {
        if sink.is_cancelled(&job.job_id).await {
            return Err(TranslationError::Cancelled(job.job_id.clone()));
        }
        Ok(())
    }

    async fn execute(
        &self,
        job: &JobDescriptor,
        sink: &dyn ProgressSink,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<JobReport> {
        let mut report = JobReport {
            job_id: job.job_id.clone(),
            target_lang: job.target_lang.clone(),
            ..Default::default()
        };

        reporter
            .report(reporter.at(JobStatus::Processing, progress_config::STARTED).message("开始处理"))
            .await;

        // 1. 爬取
        self.check_cancelled(job, sink).await?;
        reporter
            .report(reporter.at(JobStatus::Processing, progress_config::CRAWL_STARTED).message("正在爬取网站"))
            .await;
        let stage = Instant::now();
        let crawl = self.crawler.crawl(&job.url, job.page_limit).await?;
        report.stage_durations.push(("爬取".to_string(), stage.elapsed()));
        report.pages_total = crawl.pages_count;
        reporter
            .report(
                reporter
                    .at(JobStatus::Processing, progress_config::CRAWL_DONE)
                    .pages_total(crawl.pages_count)
                    .message("爬取完成"),
            )
            .await;

        // 2. 提取
        self.check_cancelled(job, sink).await?;
        let stage = Instant::now();
        let mut elements: Vec<TranslatableElement> = crawl
            .pages
            .iter()
            .flat_map(|page| page.translatable_elements.iter().cloned())
            .collect();
        let words_total: usize = elements.iter().map(|e| count_words(&e.text)).sum();
        report.elements_total = elements.len();
        report.words_total = words_total;
        report.stage_durations.push(("提取".to_string(), stage.elapsed()));
        info!("📝 提取到 {} 个可翻译元素, {} 词", elements.len(), words_total);
        reporter
            .report(
                reporter
                    .at(JobStatus::Processing, progress_config::EXTRACT_DONE)
                    .words_total(words_total)
                    .message("文本提取完成"),
            )
            .await;

        // 3. 翻译
        let stage = Instant::now();
        self.translate_elements(job, sink, reporter, &mut elements, &mut report)
            .await?;
        report.stage_durations.push(("翻译".to_string(), stage.elapsed()));

        // 4. 重建与打包
        self.check_cancelled(job, sink).await?;
        let stage = Instant::now();
        let archive = build_site(&crawl.pages, &elements, &job.target_lang)?;
        report.archive_size = archive.len();
        report.stage_durations.push(("重建打包".to_string(), stage.elapsed()));
        reporter
            .report(reporter.at(JobStatus::Processing, progress_config::PACKAGE_DONE).message("页面重建完成"))
            .await;

        // 5. 存储：sitemap 先于归档写入，归档是最后的提交点
        self.check_cancelled(job, sink).await?;
        let stage = Instant::now();
        if let Some(alternates) = &self.config.sitemap_alternates {
            let sitemap = generate_sitemap(&crawl.pages, &crawl.base_url, &job.target_lang, alternates);
            let sitemap_location = self
                .storage
                .put(
                    &storage_config::sitemap_key(&job.job_id),
                    sitemap.into_bytes(),
                    storage_config::SITEMAP_CONTENT_TYPE,
                )
                .await?;
            report.sitemap_location = Some(sitemap_location);
        }
        let location = self
            .storage
            .put(
                &storage_config::archive_key(&job.job_id),
                archive,
                storage_config::ARCHIVE_CONTENT_TYPE,
            )
            .await?;
        report.stage_durations.push(("存储".to_string(), stage.elapsed()));
        report.pages_translated = crawl.pages_count;
        report.result_location = Some(location.clone());

        reporter
            .report(
                reporter
                    .at(JobStatus::Completed, progress_config::COMPLETED)
                    .pages_translated(crawl.pages_count)
                    .words_translated(report.words_translated)
                    .result_location(&location)
                    .message("翻译完成"),
            )
            .await;

        Ok(report)
    }

    /// 分块翻译全部元素，每块之后上报进度并检查取消
    async fn translate_elements(
        &self,
        job: &JobDescriptor,
        sink: &dyn ProgressSink,
        reporter: &mut ProgressReporter<'_>,
        elements: &mut [TranslatableElement],
        report: &mut JobReport,
    ) -> Result<()> {
        let total = elements.len();
        let span = (progress_config::TRANSLATE_DONE - progress_config::EXTRACT_DONE) as usize;
        let mut done = 0usize;

        for chunk in elements.chunks_mut(self.config.report_interval) {
            self.check_cancelled(job, sink).await?;

            let protected: Vec<(String, _)> = chunk
                .iter()
                .map(|element| self.protector.protect(&element.text))
                .collect();
            let texts: Vec<String> = protected.iter().map(|(text, _)| text.clone()).collect();
            let results = self
                .translator
                .translate_batch(&texts, &job.source_lang, &job.target_lang)
                .await;

            for ((element, (_, map)), result) in chunk.iter_mut().zip(&protected).zip(results) {
                let translated = match (result.success, result.text) {
                    (true, Some(text)) => text,
                    _ => {
                        debug!("保留原文: {}", element.locator);
                        continue;
                    }
                };

                let restored = self.protector.restore(&translated, map);
                let missing = self.protector.validate_preservation(&element.text, &restored, map);
                if !missing.is_empty() {
                    warn!("⚠️ 译文丢失占位符 {:?}: {}", missing, element.locator);
                }

                if let Some(provider) = &result.provider {
                    *report.provider_counts.entry(provider.clone()).or_insert(0) += 1;
                }
                report.elements_translated += 1;
                report.words_translated += count_words(&element.text);
                element.translated_text = Some(restored);
                element.provider = result.provider;
            }

            done += chunk.len();
            let progress = progress_config::EXTRACT_DONE as usize + span * done / total;
            reporter
                .report(
                    reporter
                        .at(JobStatus::Processing, progress as u8)
                        .words_translated(report.words_translated)
                        .message(&format!("已翻译 {}/{} 个元素", done, total)),
                )
                .await;
        }

        if total == 0 {
            reporter
                .report(reporter.at(JobStatus::Processing, progress_config::TRANSLATE_DONE))
                .await;
        }
        info!(
            "🔤 翻译完成: {}/{} 个元素 ({:.1}%)",
            report.elements_translated,
            total,
            report.success_rate()
        );
        Ok(())
    }
}

/// 资源文件翻译输出
#[derive(Debug, Clone, PartialEq)]
pub enum FileTranslationOutput {
    /// 单个目标语言
    Single { filename: String, content: String },
    /// 多个目标语言打包为zip
    Archive {
        filename: String,
        bytes: Vec<u8>,
        entries: Vec<String>,
    },
}

/// 资源文件分析结果
#[derive(Debug, Clone, Serialize)]
pub struct ResourceAnalysis {
    pub format: FileFormat,
    pub statistics: ResourceStatistics,
    pub complexity: f64,
    pub placeholder_counts: IndexMap<String, usize>,
}

/// 分析资源文件：格式、键数、字符数与占位符复杂度
pub fn analyze_resource_file(filename: &str, content: &str) -> Result<ResourceAnalysis> {
    let (format, flat) = localization::detect_and_parse(filename, content)?;
    let protector = PlaceholderProtector::new();
    let values: Vec<String> = flat.values().cloned().collect();

    let placeholder_counts = PlaceholderStats::count_by_type(&protector, &values)
        .into_iter()
        .map(|(kind, count)| (kind.to_string(), count))
        .collect();

    Ok(ResourceAnalysis {
        format,
        statistics: ResourceStatistics::analyze(&flat),
        complexity: PlaceholderStats::complexity_score(&protector, &values),
        placeholder_counts,
    })
}

/// 翻译本地化资源文件
///
/// 每个目标语言输出一份与原文件结构相同的文件；翻译失败的键保留原文。
/// 只有一个目标语言时返回单个文件，否则返回zip归档。
pub async fn translate_resource_file(
    service: &TranslationService,
    filename: &str,
    content: &str,
    source_lang: &str,
    target_langs: &[String],
) -> Result<FileTranslationOutput> {
    if target_langs.is_empty() {
        return Err(crate::translation_error!(input_validation, filename, "未指定目标语言"));
    }

    let (format, flat) = localization::detect_and_parse(filename, content)?;
    info!("📄 {} 识别为 {}，共 {} 个键", filename, format.as_str(), flat.len());

    let protector = PlaceholderProtector::new();
    let (protected, maps) = protector.protect_batch(&flat);
    let keys: Vec<String> = protected.keys().cloned().collect();
    let texts: Vec<String> = protected.values().cloned().collect();

    let stem = Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(filename)
        .to_string();

    let mut outputs: Vec<(String, String)> = Vec::with_capacity(target_langs.len());
    for lang in target_langs {
        let results = service.translate_batch(&texts, source_lang, lang).await;

        let mut translated = FlatMap::with_capacity(keys.len());
        let mut succeeded = 0usize;
        for ((key, text), result) in keys.iter().zip(&texts).zip(results) {
            let value = match (result.success, result.text) {
                (true, Some(value)) => {
                    succeeded += 1;
                    value
                }
                _ => text.clone(),
            };
            translated.insert(key.clone(), value);
        }

        let restored = protector.restore_batch(&translated, &maps);
        let output = localization::reconstruct(&restored, format, Some(content))?;
        info!("🌐 {}: {}/{} 个键翻译成功", lang, succeeded, keys.len());
        outputs.push((localization::output_filename(&stem, lang, format), output));
    }

    if outputs.len() == 1 {
        let (filename, content) = outputs.remove(0);
        return Ok(FileTranslationOutput::Single { filename, content });
    }

    let bytes = write_archive(&outputs)?;
    let base = Path::new(&stem)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("translations");
    Ok(FileTranslationOutput::Archive {
        filename: format!("{}_translations.zip", base),
        bytes,
        entries: outputs.into_iter().map(|(name, _)| name).collect(),
    })
}

/// 启动任务工作者
///
/// 逐个消费通道中的任务描述，通道关闭后结束并返回已处理的任务数。
pub fn spawn_worker(
    orchestrator: Arc<TranslationOrchestrator>,
    sink: Arc<dyn ProgressSink>,
    mut receiver: mpsc::Receiver<JobDescriptor>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut processed = 0usize;
        while let Some(job) = receiver.recv().await {
            let started = Instant::now();
            match orchestrator.run(&job, sink.as_ref()).await {
                Ok(report) => info!(
                    "📦 任务 {} 结束: {} 个页面, 用时 {:?}",
                    job.job_id,
                    report.pages_translated,
                    started.elapsed()
                ),
                Err(e) => warn!("⚠️ 任务 {} 未完成: {}", job.job_id, e),
            }
            processed += 1;
        }
        debug!("任务通道已关闭");
        processed
    })
}
