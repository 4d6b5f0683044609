//! # 演示入口
//!
//! 从命令行取一个图片地址，跑完整条捕获流水线：定位 → 抓取 → 规范化 →
//! 写剪贴板 → 入队。用于本地验证引擎行为，不承载任何宿主接入逻辑。
//!
//! ```text
//! pinclip https://example.com/a.png
//! ```

use std::sync::Arc;

use pinclip::capture::{CaptureConfig, CaptureHandler};
use pinclip::dom::{Document, Element};
use pinclip::error::AppError;
use pinclip::paste::{
    default_input_selectors, HostAllowlist, InputSelector, InputSurface, PageAdapter,
    PasteOrchestrator, SystemPasteInvoker,
};
use pinclip::service::{CaptureService, LogNotifier};
use pinclip::store::JsonFileStore;

/// 演示程序没有真实页面，输入框永远定位失败。
struct HeadlessPage;

impl PageAdapter for HeadlessPage {
    fn locate_input(&mut self, _selectors: &[InputSelector]) -> Option<&mut dyn InputSurface> {
        None
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let url = match std::env::args().nth(1) {
        Some(url) => url,
        None => {
            eprintln!("用法: pinclip <图片地址>");
            std::process::exit(2);
        }
    };

    let config = CaptureConfig::default();
    let queue_bound = config.queue_bound;
    let settle_delay_ms = config.settle_delay_ms;
    let handler = CaptureHandler::new(config)?;

    let store = Arc::new(JsonFileStore::new(
        std::env::temp_dir().join("pinclip-demo"),
    )?);
    let orchestrator = PasteOrchestrator::new(
        default_input_selectors(),
        settle_delay_ms,
        Box::new(SystemPasteInvoker),
    );
    let service = CaptureService::new(
        handler,
        store,
        queue_bound,
        orchestrator,
        HostAllowlist::default(),
        Box::new(LogNotifier),
    );

    service.announce_ready().await;

    let document = Document::new("demo.local", Element::new("body"));
    let element = Element::new("img").with_attr("src", url);

    let report = service
        .capture_and_transfer(&document, &element, &mut HeadlessPage, None)
        .await?;

    log::info!(
        "🎉 捕获完成 - id={} 来源={} 已粘贴={}",
        report.record.id,
        report.record.source_url,
        report.pasted
    );

    Ok(())
}
