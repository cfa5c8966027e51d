use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

use site_translator::config::Cli;
use site_translator::orchestrator::{
    analyze_resource_file, translate_resource_file, FileTranslationOutput, JobDescriptor,
    OrchestratorConfig, TracingProgressSink, TranslationOrchestrator,
};
use site_translator::stats::{format_duration, print_job_report, print_resource_statistics};
use site_translator::storage::LocalDirectoryStorage;
use site_translator::translator::TranslationService;
use site_translator::utils::{
    init_logging, resource_output_path, site_archive_filename, validate_input_source, InputSource,
};
use site_translator::web_crawler::WebCrawler;

#[tokio::main]
async fn main() -> Result<()> {
    // .env 中的密钥需要在解析参数前加载
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // 初始化日志系统
    init_logging(cli.verbose, cli.quiet);

    let total_start = Instant::now();
    let outcome = match validate_input_source(&cli.input) {
        Ok(InputSource::Url(url)) => translate_site(&cli, &url).await,
        Ok(InputSource::File(path)) => translate_file(&cli, &path).await,
        Err(e) => Err(e.into()),
    };

    match outcome {
        Ok(()) => {
            if !cli.quiet {
                info!("✅ 全部完成！总耗时: {}", format_duration(total_start.elapsed()));
            }
        }
        Err(e) => {
            error!("❌ 翻译失败: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// 整站翻译：每个目标语言一个任务，归档写入输出目录
async fn translate_site(cli: &Cli, url: &Url) -> Result<()> {
    let languages = cli.target_languages();
    if languages.is_empty() {
        anyhow::bail!("未指定目标语言");
    }

    let service = Arc::new(
        TranslationService::from_config(&cli.translator_config()).context("初始化翻译服务失败")?,
    );
    let storage = Arc::new(LocalDirectoryStorage::new(&cli.output));
    let mut config = OrchestratorConfig::default();
    if cli.sitemap {
        config = config.sitemap(languages.clone());
    }

    if !cli.quiet {
        info!("🚀 启动整站翻译");
        info!("🌐 站点: {}", url);
        info!("🔤 语言: {} → {}", cli.source_lang, languages.join(", "));
        info!("📂 输出目录: {}", cli.output.display());
        info!("🔧 翻译源数量: {}", service.provider_count());
    }

    let mut failures = 0usize;
    for lang in &languages {
        let job_start = Instant::now();
        let crawler = WebCrawler::with_http(cli.crawler_config())?;
        let orchestrator = TranslationOrchestrator::new(crawler, service.clone(), storage.clone())
            .with_config(config.clone());

        let archive_name = site_archive_filename(url, lang);
        let job_id = archive_name.trim_end_matches(".zip");
        let job = JobDescriptor::new(url.as_str(), &cli.source_lang, lang)
            .with_job_id(job_id)
            .with_page_limit(cli.pages);

        match orchestrator.run(&job, &TracingProgressSink).await {
            Ok(report) => {
                if cli.stats || cli.verbose {
                    print_job_report(&report, job_start.elapsed());
                }
            }
            Err(e) => {
                warn!("⚠️ {} 翻译失败: {}", lang, e.user_message());
                failures += 1;
            }
        }
    }

    if cli.stats {
        if let Some(usage) = service.usage().await {
            info!(
                "📈 翻译额度: {}/{} ({:.2}%), 剩余 {} 字符",
                usage.character_count,
                usage.character_limit,
                usage.percentage_used,
                usage.remaining()
            );
        }
    }

    if failures > 0 {
        anyhow::bail!("{}/{} 个目标语言翻译失败", failures, languages.len());
    }
    Ok(())
}

/// 资源文件翻译：单个语言输出同格式文件，多个语言输出zip
async fn translate_file(cli: &Cli, path: &Path) -> Result<()> {
    let languages = cli.target_languages();
    if languages.is_empty() {
        anyhow::bail!("未指定目标语言");
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("读取文件失败: {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .context("无效的文件名")?;

    if cli.stats {
        let analysis = analyze_resource_file(filename, &content)?;
        print_resource_statistics(&analysis.statistics, analysis.complexity);
    }

    let service =
        TranslationService::from_config(&cli.translator_config()).context("初始化翻译服务失败")?;
    if !cli.quiet {
        info!("📄 翻译资源文件: {} → {}", path.display(), languages.join(", "));
    }

    let output =
        translate_resource_file(&service, filename, &content, &cli.source_lang, &languages).await?;
    let (relative, bytes) = match output {
        FileTranslationOutput::Single { filename, content } => (filename, content.into_bytes()),
        FileTranslationOutput::Archive {
            filename,
            bytes,
            entries,
        } => {
            info!("📦 打包 {} 个语言文件", entries.len());
            (filename, bytes)
        }
    };

    let output_path = resource_output_path(&cli.output, &relative);
    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("创建目录失败: {}", parent.display()))?;
    }
    tokio::fs::write(&output_path, bytes)
        .await
        .with_context(|| format!("写入文件失败: {}", output_path.display()))?;

    if !cli.quiet {
        info!("💾 已写入: {}", output_path.display());
    }
    Ok(())
}
