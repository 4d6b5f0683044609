//! # 剪贴板写入模块
//!
//! ## 设计思路
//!
//! 没有任何一条剪贴板写入路径在所有平台/宿主环境下都可靠：直接写入要求
//! 当前上下文持有焦点；部分环境根本不支持图片写入；对端上下文的写入能力
//! 在不同浏览器间不一致。因此写入建模为策略级联：按配置顺序逐个尝试，
//! 任一策略成功即停，全部失败才向上返回最后一次失败。
//!
//! ## 实现思路
//!
//! 策略统一实现 `ClipboardStrategy`，失败携带 `ClipboardFailureKind` 分类。
//! 实际的平台写入放在阻塞线程执行，避免卡住 async 运行时。
//! 兜底策略沿用“指数退避 + 抖动 + 总预算”的有限重试。

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::error::{CaptureError, ClipboardFailure, ClipboardFailureKind};
use super::handler::CaptureHandler;
use super::source::RasterImage;
use super::CaptureConfig;
use crate::peer::{PeerCallError, PeerHandle, PeerRequest};

/// 当前上下文的焦点状态句柄。每次捕获前由文档快照刷新。
#[derive(Debug, Clone, Default)]
pub struct FocusFlag {
    focused: Arc<AtomicBool>,
}

impl FocusFlag {
    pub fn new(focused: bool) -> Self {
        Self {
            focused: Arc::new(AtomicBool::new(focused)),
        }
    }

    pub fn set(&self, focused: bool) {
        self.focused.store(focused, Ordering::Relaxed);
    }

    pub fn is_focused(&self) -> bool {
        self.focused.load(Ordering::Relaxed)
    }
}

/// 进入级联前准备好的写入负载：像素与 Data URL 双形态，各策略按需取用。
#[derive(Debug, Clone)]
pub struct ClipboardPayload {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub data_url: String,
}

pub type StrategyFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), ClipboardFailure>> + Send + 'a>>;

/// 剪贴板写入策略。实现者自行决定失败分类。
///
/// 嵌入方可以注入自定义策略（例如测试替身或宿主环境特有的写入路径）。
pub trait ClipboardStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn write<'a>(
        &'a self,
        payload: &'a ClipboardPayload,
        config: &'a CaptureConfig,
    ) -> StrategyFuture<'a>;
}

/// 按顺序执行策略级联。成功即停，全部失败返回最后一次失败。
pub(crate) async fn cascade_write(
    strategies: &[Arc<dyn ClipboardStrategy>],
    payload: &ClipboardPayload,
    config: &CaptureConfig,
) -> Result<(), ClipboardFailure> {
    let mut last_failure =
        ClipboardFailure::unsupported("没有配置任何剪贴板写入策略".to_string());

    for strategy in strategies {
        log::debug!("📋 尝试剪贴板策略：{}", strategy.name());
        match strategy.write(payload, config).await {
            Ok(()) => {
                log::info!("✅ 剪贴板写入成功（策略：{}）", strategy.name());
                return Ok(());
            }
            Err(failure) => {
                log::warn!("⚠️ 策略 {} 失败：{}", strategy.name(), failure);
                last_failure = failure;
            }
        }
    }

    Err(last_failure)
}

// ============================================================================
// 策略 1：直接平台写入（要求焦点）
// ============================================================================

pub(crate) struct DirectStrategy {
    focus: FocusFlag,
}

impl DirectStrategy {
    pub(crate) fn new(focus: FocusFlag) -> Self {
        Self { focus }
    }
}

impl ClipboardStrategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn write<'a>(
        &'a self,
        payload: &'a ClipboardPayload,
        _config: &'a CaptureConfig,
    ) -> StrategyFuture<'a> {
        Box::pin(async move {
            // 平台约定：无焦点的上下文写剪贴板会被拒绝，直接短路不消耗平台调用。
            if !self.focus.is_focused() {
                return Err(ClipboardFailure::focus_denied(
                    "当前上下文未持有焦点".to_string(),
                ));
            }

            let width = payload.width as usize;
            let height = payload.height as usize;
            let rgba = payload.rgba.clone();

            tokio::task::spawn_blocking(move || write_image_once(width, height, &rgba))
                .await
                .map_err(|e| ClipboardFailure::unknown(format!("线程执行失败：{}", e)))?
        })
    }
}

// ============================================================================
// 策略 2：阻塞线程 + 指数退避重试的兜底写入
// ============================================================================

pub(crate) struct RetryWriterStrategy;

impl ClipboardStrategy for RetryWriterStrategy {
    fn name(&self) -> &'static str {
        "retry-writer"
    }

    fn write<'a>(
        &'a self,
        payload: &'a ClipboardPayload,
        config: &'a CaptureConfig,
    ) -> StrategyFuture<'a> {
        let retries = config.clipboard_retries;
        let retry_delay = config.clipboard_retry_delay;
        let retry_max_total_ms = config.clipboard_retry_max_total_ms;
        let retry_max_delay_ms = config.clipboard_retry_max_delay_ms;

        Box::pin(async move {
            let width = payload.width as usize;
            let height = payload.height as usize;
            let rgba = payload.rgba.clone();

            tokio::task::spawn_blocking(move || {
                write_image_with_retry(
                    width,
                    height,
                    &rgba,
                    retries,
                    retry_delay,
                    retry_max_total_ms,
                    retry_max_delay_ms,
                )
            })
            .await
            .map_err(|e| ClipboardFailure::unknown(format!("线程执行失败：{}", e)))?
        })
    }
}

/// 在阻塞线程中执行写入 + 重试。
fn write_image_with_retry(
    width: usize,
    height: usize,
    rgba: &[u8],
    retries: u32,
    retry_delay: u64,
    retry_max_total_ms: u64,
    retry_max_delay_ms: u64,
) -> Result<(), ClipboardFailure> {
    let retry_count = retries.max(1);
    let started = Instant::now();
    let mut last_failure = ClipboardFailure::unknown("未知错误".to_string());

    for attempt in 1..=retry_count {
        if attempt > 1 {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            if elapsed_ms >= retry_max_total_ms {
                log::warn!(
                    "⏱️ 剪贴板写入重试预算耗尽（{}ms >= {}ms）",
                    elapsed_ms,
                    retry_max_total_ms
                );
                break;
            }

            let wait_ms =
                backoff_delay_with_jitter(retry_delay.max(1), attempt - 1, retry_max_delay_ms);

            if would_exceed_retry_budget(elapsed_ms, wait_ms, retry_max_total_ms) {
                log::warn!(
                    "⏱️ 跳过第 {} 次重试：等待 {}ms 会超过预算 {}ms",
                    attempt,
                    wait_ms,
                    retry_max_total_ms
                );
                break;
            }

            log::debug!("🔄 重试 {}/{}，等待 {}ms（指数退避+抖动）", attempt, retry_count, wait_ms);
            std::thread::sleep(Duration::from_millis(wait_ms));
        }

        match write_image_once(width, height, rgba) {
            Ok(()) => {
                log::info!("✅ 复制成功 (尝试 {})", attempt);
                return Ok(());
            }
            Err(failure) => {
                let retryable = failure.kind != ClipboardFailureKind::Unsupported;
                log::warn!("❌ 尝试 {} 失败: {}（retryable={}）", attempt, failure, retryable);
                last_failure = failure;

                if !retryable {
                    log::warn!("🛑 非可重试错误，提前终止重试");
                    break;
                }
            }
        }
    }

    Err(last_failure)
}

/// 单次平台写入，按错误形态分类失败。
fn write_image_once(width: usize, height: usize, rgba: &[u8]) -> Result<(), ClipboardFailure> {
    let mut clipboard = arboard::Clipboard::new()
        .map_err(|e| classify_platform_error("无法访问剪贴板", e))?;

    let image_data = arboard::ImageData {
        width,
        height,
        bytes: Cow::Borrowed(rgba),
    };

    clipboard
        .set_image(image_data)
        .map_err(|e| classify_platform_error("复制失败", e))
}

fn classify_platform_error(operation: &str, err: arboard::Error) -> ClipboardFailure {
    let message = format!("{}：{}", operation, err);
    match err {
        arboard::Error::ClipboardNotSupported | arboard::Error::ConversionFailure => {
            ClipboardFailure::unsupported(message)
        }
        _ => ClipboardFailure::unknown(message),
    }
}

fn backoff_delay_with_jitter(base_delay_ms: u64, attempt: u32, max_delay_ms: u64) -> u64 {
    let exp = base_delay_ms.saturating_mul(1_u64 << attempt.saturating_sub(1).min(8));
    let capped = exp.min(max_delay_ms.max(base_delay_ms));
    let jitter_bound = (capped / 3).max(1);
    // 亚秒纳秒当随机源足够了，重试抖动不需要密码学质量。
    let nanos = chrono::Utc::now().timestamp_subsec_nanos() as u64;
    let jitter = nanos % (jitter_bound + 1);
    capped.saturating_add(jitter)
}

fn would_exceed_retry_budget(elapsed_ms: u64, wait_ms: u64, budget_ms: u64) -> bool {
    elapsed_ms.saturating_add(wait_ms) > budget_ms
}

// ============================================================================
// 策略 3：委托对端上下文写入
// ============================================================================

pub(crate) struct PeerStrategy {
    peer: PeerHandle,
}

impl PeerStrategy {
    pub(crate) fn new(peer: PeerHandle) -> Self {
        Self { peer }
    }
}

impl ClipboardStrategy for PeerStrategy {
    fn name(&self) -> &'static str {
        "peer"
    }

    fn write<'a>(
        &'a self,
        payload: &'a ClipboardPayload,
        _config: &'a CaptureConfig,
    ) -> StrategyFuture<'a> {
        Box::pin(async move {
            self.peer
                .call(PeerRequest::WriteImageToClipboard {
                    image_data_url: payload.data_url.clone(),
                })
                .await
                .map(|_| ())
                .map_err(|e| match e {
                    PeerCallError::Unreachable(msg) => {
                        ClipboardFailure::unsupported(format!("对端上下文不可达：{}", msg))
                    }
                    PeerCallError::Rejected(msg) => {
                        ClipboardFailure::unknown(format!("对端写入失败：{}", msg))
                    }
                })
        })
    }
}

// ============================================================================
// 级联入口
// ============================================================================

impl CaptureHandler {
    /// 将规范化图片写入剪贴板。策略顺序来自配置。
    pub(crate) async fn copy_image_to_clipboard(
        &self,
        image: &RasterImage,
        config: &CaptureConfig,
    ) -> Result<(), CaptureError> {
        let decoded = image::load_from_memory(&image.bytes)
            .map_err(|e| CaptureError::Decode(format!("写入前解码失败：{}", e)))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();

        let payload = ClipboardPayload {
            width,
            height,
            rgba: decoded.into_raw(),
            data_url: image.to_data_url(),
        };

        cascade_write(self.strategies(), &payload, config)
            .await
            .map_err(CaptureError::Clipboard)
    }

    /// 文本写入只有一条平台路径，失败时走兜底重试。
    pub(crate) async fn copy_text_to_clipboard(
        &self,
        text: &str,
        config: &CaptureConfig,
    ) -> Result<(), CaptureError> {
        let retries = config.clipboard_retries;
        let retry_delay = config.clipboard_retry_delay;
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut last = ClipboardFailure::unknown("未知错误".to_string());
            for attempt in 1..=retries.max(1) {
                if attempt > 1 {
                    std::thread::sleep(Duration::from_millis(retry_delay));
                }
                let result = arboard::Clipboard::new()
                    .and_then(|mut c| c.set_text(text.clone()))
                    .map_err(|e| classify_platform_error("文本写入失败", e));
                match result {
                    Ok(()) => return Ok(()),
                    Err(failure) => last = failure,
                }
            }
            Err(last)
        })
        .await
        .map_err(|e| {
            CaptureError::Clipboard(ClipboardFailure::unknown(format!("线程执行失败：{}", e)))
        })?
        .map_err(CaptureError::Clipboard)
    }
}
