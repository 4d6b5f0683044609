//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `CaptureConfig`，保证运行时行为可观测、可调整、可测试。
//! 其中剪贴板策略顺序是显式配置项：不同浏览器/平台对对端上下文写剪贴板的
//! 支持并不一致，观察到的两个实现变体顺序也不相同，因此顺序不做硬编码。

/// 剪贴板写入路径标识，按配置顺序依次尝试。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardRoute {
    /// 直接平台写入（要求当前上下文持有焦点）。
    Direct,
    /// 阻塞线程 + 指数退避重试的兜底写入。
    RetryWriter,
    /// 委托对端上下文从它自己的环境写入。
    Peer,
}

/// 捕获流水线配置。
///
/// 字段覆盖抓取、规范化、剪贴板写入、队列与粘贴编排五个阶段。
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// 抓取原始字节允许的最大体积（字节）。
    pub max_file_size: u64,
    /// 网络抓取整体超时（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时（秒）。
    pub connect_timeout: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 缩略图长边上限（像素）。
    pub thumbnail_max_dimension: u32,
    /// 缩略图 JPEG 质量（1~100）。
    pub thumbnail_jpeg_quality: u8,
    /// 图片队列与提示词队列的容量上限。
    pub queue_bound: usize,
    /// 粘贴编排中模板插入后的静置延迟（毫秒）。
    pub settle_delay_ms: u64,
    /// 对端上下文单次调用超时（毫秒）。
    pub peer_call_timeout_ms: u64,
    /// 剪贴板写入策略顺序。
    pub clipboard_strategy_order: Vec<ClipboardRoute>,
    /// 兜底写入最大重试次数。
    pub clipboard_retries: u32,
    /// 兜底写入重试基础间隔（毫秒）。
    pub clipboard_retry_delay: u64,
    /// 兜底写入单次流程总重试预算（毫秒）。
    pub clipboard_retry_max_total_ms: u64,
    /// 兜底写入单次退避延迟上限（毫秒）。
    pub clipboard_retry_max_delay_ms: u64,
    /// 对端上下文是否允许尝试写剪贴板（浏览器间行为不一致，可关闭）。
    pub peer_clipboard_enabled: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            thumbnail_max_dimension: 150,
            thumbnail_jpeg_quality: 80,
            queue_bound: 20,
            settle_delay_ms: 50,
            peer_call_timeout_ms: 10_000,
            clipboard_strategy_order: vec![
                ClipboardRoute::Direct,
                ClipboardRoute::RetryWriter,
                ClipboardRoute::Peer,
            ],
            clipboard_retries: 3,
            clipboard_retry_delay: 100,
            clipboard_retry_max_total_ms: 1_800,
            clipboard_retry_max_delay_ms: 900,
            peer_clipboard_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategy_order_keeps_peer_last() {
        let config = CaptureConfig::default();

        assert_eq!(
            config.clipboard_strategy_order,
            vec![
                ClipboardRoute::Direct,
                ClipboardRoute::RetryWriter,
                ClipboardRoute::Peer
            ]
        );
    }

    #[test]
    fn default_bounds_match_product_contract() {
        let config = CaptureConfig::default();

        assert_eq!(config.queue_bound, 20);
        assert_eq!(config.thumbnail_max_dimension, 150);
    }
}
