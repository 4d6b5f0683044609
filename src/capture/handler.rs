//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `CaptureHandler` 只负责流程编排与配置管理，不关心宿主页面的接入形态。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 从元素快照定位图片来源
//! 3. 按级联抓取原始字节
//! 4. 规范化为不透明 PNG 并生成缩略图
//! 5. 按策略级联写入剪贴板
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<CaptureConfig>>` 支持运行时调整。
//! - 单次捕获内使用“同一配置快照”，避免处理中途配置漂移。
//! - 记录 `locate/fetch/normalize/copy/total` 阶段耗时，便于性能诊断。
//! - 并发触发不做互斥，后写者覆盖剪贴板（与平台剪贴板语义一致）。

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::clipboard_writer::{
    ClipboardStrategy, DirectStrategy, FocusFlag, PeerStrategy, RetryWriterStrategy,
};
use super::source::RasterImage;
use super::{CaptureConfig, CaptureError, ClipboardRoute};
use crate::dom::{Document, Element};
use crate::peer::{BackgroundPeer, PeerHandle, PeerRequest};

/// 单次捕获的产出：主图、缩略图与来源描述。
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub image: RasterImage,
    pub thumbnail: RasterImage,
    /// 来源描述（远程地址或内联占位），用于日志与入队记录。
    pub source: String,
}

/// 捕获处理器。
///
/// 封装配置状态、页面侧 HTTP 客户端与对端句柄，编排各子模块实现完整流程。
pub struct CaptureHandler {
    config: Arc<RwLock<CaptureConfig>>,
    peer: PeerHandle,
    page_client: reqwest::Client,
    strategies: Vec<Arc<dyn ClipboardStrategy>>,
    focus: FocusFlag,
}

impl CaptureHandler {
    /// 根据初始配置创建处理器，同时启动对端服务循环。
    ///
    /// 必须在 tokio 运行时内调用。
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        Self::assemble(config, None)
    }

    /// 用自定义剪贴板策略创建处理器（测试替身或宿主特有的写入路径）。
    pub fn with_strategies(
        config: CaptureConfig,
        strategies: Vec<Arc<dyn ClipboardStrategy>>,
    ) -> Result<Self, CaptureError> {
        Self::assemble(config, Some(strategies))
    }

    fn assemble(
        config: CaptureConfig,
        strategies: Option<Vec<Arc<dyn ClipboardStrategy>>>,
    ) -> Result<Self, CaptureError> {
        let peer = BackgroundPeer::spawn(config.clone())?;

        let page_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .build()
            .map_err(|e| CaptureError::Fetch(format!("HTTP 客户端初始化失败：{}", e)))?;

        let focus = FocusFlag::new(true);
        let strategies =
            strategies.unwrap_or_else(|| Self::build_strategies(&config, &peer, &focus));

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            peer,
            page_client,
            strategies,
            focus,
        })
    }

    fn build_strategies(
        config: &CaptureConfig,
        peer: &PeerHandle,
        focus: &FocusFlag,
    ) -> Vec<Arc<dyn ClipboardStrategy>> {
        config
            .clipboard_strategy_order
            .iter()
            .map(|route| -> Arc<dyn ClipboardStrategy> {
                match route {
                    ClipboardRoute::Direct => Arc::new(DirectStrategy::new(focus.clone())),
                    ClipboardRoute::RetryWriter => Arc::new(RetryWriterStrategy),
                    ClipboardRoute::Peer => Arc::new(PeerStrategy::new(peer.clone())),
                }
            })
            .collect()
    }

    /// 获取配置快照，保证单次捕获链路使用一致参数。
    pub(crate) fn config_snapshot(&self) -> Result<CaptureConfig, CaptureError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| CaptureError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    pub(crate) fn peer(&self) -> &PeerHandle {
        &self.peer
    }

    pub(crate) fn page_client(&self) -> &reqwest::Client {
        &self.page_client
    }

    pub(crate) fn strategies(&self) -> &[Arc<dyn ClipboardStrategy>] {
        &self.strategies
    }

    /// 从文档快照刷新焦点状态。每次捕获前调用。
    pub fn sync_focus(&self, document: &Document) {
        self.focus.set(document.has_focus());
    }

    /// 宿主接入完成后向对端广播就绪信号（失败静默）。
    pub async fn announce_ready(&self) {
        self.peer.notify(PeerRequest::ContentScriptReady).await;
    }

    /// 捕获主入口：从元素快照定位、抓取、规范化并写入剪贴板。
    pub async fn capture_element(
        &self,
        document: &Document,
        element: &Element,
    ) -> Result<CaptureOutcome, CaptureError> {
        let config = self.config_snapshot()?;
        self.sync_focus(document);
        let total_start = Instant::now();

        // 定位不出图片来源是 `Locate` 失败；`NoTarget` 留给粘贴路径的输入框缺失。
        let reference = Self::locate_image(element).ok_or_else(|| {
            CaptureError::Locate(format!("元素 <{}> 未解析出图片来源", element.tag()))
        })?;
        let source = reference.describe();
        log::debug!("🔍 定位到图片来源：{}", source);

        let fetch_start = Instant::now();
        let raw = self.fetch_bytes(&reference, &config).await?;
        let fetch_elapsed = fetch_start.elapsed();

        let normalize_start = Instant::now();
        let image = self.normalize(&raw, &config)?;
        let thumbnail = self.make_thumbnail(&image, &config)?;
        let normalize_elapsed = normalize_start.elapsed();

        let copy_start = Instant::now();
        self.copy_image_to_clipboard(&image, &config).await?;
        let copy_elapsed = copy_start.elapsed();

        let total_elapsed = total_start.elapsed();
        log::info!(
            "✅ 图片捕获完成 - fetch={}ms normalize={}ms copy={}ms total={}ms",
            fetch_elapsed.as_millis(),
            normalize_elapsed.as_millis(),
            copy_elapsed.as_millis(),
            total_elapsed.as_millis()
        );

        Ok(CaptureOutcome {
            image,
            thumbnail,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::test_support::spawn_handler;
    use crate::dom::PixelSurface;

    #[tokio::test]
    async fn capture_fails_fast_when_element_has_no_image() {
        let handler = spawn_handler().await;
        let document = Document::new("example.com", Element::new("body"));
        let element = Element::new("p");

        let result = handler.capture_element(&document, &element).await;

        assert!(matches!(result, Err(CaptureError::Locate(_))));
    }

    #[tokio::test]
    async fn focus_flag_follows_document_snapshot() {
        let handler = spawn_handler().await;
        let blurred = Document::new("example.com", Element::new("body")).with_focus(false);

        handler.sync_focus(&blurred);

        assert!(!handler.focus.is_focused());
    }

    #[tokio::test]
    async fn canvas_capture_runs_pipeline_without_network() {
        let handler = spawn_handler().await;
        let config = handler.config_snapshot().expect("config snapshot failed");
        let element = Element::new("canvas").with_surface(PixelSurface {
            width: 2,
            height: 2,
            rgba: vec![255; 16],
        });

        // 只验证到规范化为止，剪贴板阶段依赖系统环境。
        let reference = CaptureHandler::locate_image(&element).expect("locate failed");
        let raw = handler
            .fetch_bytes(&reference, &config)
            .await
            .expect("fetch failed");
        let image = handler.normalize(&raw, &config).expect("normalize failed");

        assert_eq!(image.mime, "image/png");
        assert_eq!((image.width, image.height), (2, 2));
    }
}
