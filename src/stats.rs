use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;

use crate::api_constants::service_config;
use crate::localization::FlatMap;

/// 单个整站翻译任务的统计报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub target_lang: String,
    pub pages_total: usize,
    pub pages_translated: usize,
    pub elements_total: usize,
    pub elements_translated: usize,
    pub words_total: usize,
    pub words_translated: usize,
    /// 各翻译源成功翻译的元素数
    pub provider_counts: IndexMap<String, usize>,
    /// 各阶段耗时，按执行顺序
    pub stage_durations: Vec<(String, Duration)>,
    pub archive_size: usize,
    pub result_location: Option<String>,
    pub sitemap_location: Option<String>,
}

impl JobReport {
    /// 元素翻译成功率（百分比）
    pub fn success_rate(&self) -> f64 {
        if self.elements_total == 0 {
            return 100.0;
        }
        self.elements_translated as f64 / self.elements_total as f64 * 100.0
    }
}

/// 资源文件统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceStatistics {
    pub total_keys: usize,
    pub total_characters: usize,
    pub average_length: f64,
    pub estimated_cost_usd: f64,
}

impl ResourceStatistics {
    /// 统计键数与字符数，成本按每字符单价估算
    pub fn analyze(flat: &FlatMap) -> Self {
        let total_keys = flat.len();
        let total_characters: usize = flat.values().map(|v| v.chars().count()).sum();
        let average_length = if total_keys == 0 {
            0.0
        } else {
            total_characters as f64 / total_keys as f64
        };
        Self {
            total_keys,
            total_characters,
            average_length,
            estimated_cost_usd: total_characters as f64 * service_config::COST_PER_CHARACTER_USD,
        }
    }
}

/// 打印整站翻译统计
pub fn print_job_report(report: &JobReport, total_duration: Duration) {
    println!("\n📊 翻译统计报告 [{}]:", report.target_lang);
    println!("═══════════════════════════════════════");

    println!("⏱️  时间分解:");
    for (stage, duration) in &report.stage_durations {
        println!("   {}: {}", stage, format_duration(*duration));
    }
    println!("   总耗时: {}", format_duration(total_duration));

    println!("\n🌐 站点统计:");
    println!("   页面: {}/{}", report.pages_translated, report.pages_total);
    println!("   词数: {}/{}", report.words_translated, report.words_total);
    println!(
        "   归档大小: {} 字节 ({:.1} KB)",
        report.archive_size,
        report.archive_size as f64 / 1024.0
    );

    println!("\n🔤 翻译统计:");
    println!(
        "   元素: {}/{} ({:.1}%)",
        report.elements_translated,
        report.elements_total,
        report.success_rate()
    );
    for (provider, count) in &report.provider_counts {
        println!("   {}: {} 项", provider, count);
    }

    if let Some(location) = &report.result_location {
        println!("\n💾 结果: {}", location);
    }
    if let Some(location) = &report.sitemap_location {
        println!("🗺️  站点地图: {}", location);
    }
}

/// 打印资源文件统计
pub fn print_resource_statistics(stats: &ResourceStatistics, complexity: f64) {
    println!("\n📊 资源文件统计:");
    println!("═══════════════════════════════════════");
    println!("   键数量: {}", stats.total_keys);
    println!("   字符数: {}", stats.total_characters);
    println!("   平均长度: {:.1}", stats.average_length);
    println!("   占位符复杂度: {:.3}", complexity);
    println!("   预估成本: ${:.4}", stats.estimated_cost_usd);
}

/// 格式化持续时间
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}
