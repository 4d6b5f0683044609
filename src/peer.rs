//! # 跨上下文消息模块
//!
//! ## 设计思路
//!
//! 页面上下文与特权后台上下文之间没有共享内存，只有离散的一问一答消息。
//! 这里把它建模为显式的请求/响应协议：每个请求携带关联 id，响应通过一次性
//! 通道返回，等待时长由调用方持有的超时控制——通道关闭或超时都是终态失败，
//! 绝不无限等待。
//!
//! ## 实现思路
//!
//! - `PeerHandle` 是页面侧的发送端：`call` 一问一答，`notify` 只发不等。
//! - `BackgroundPeer` 是后台侧的服务循环：持有不受页面网络策略限制的
//!   HTTP 客户端，逐条消费请求并回写结果。
//! - 传输失败（`Unreachable`）与对端业务失败（`Rejected`）是两类错误，
//!   由调用方按所在阶段分别翻译。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use tokio::sync::{mpsc, oneshot};

use crate::capture::{CaptureConfig, CaptureError};

const PEER_CHANNEL_CAPACITY: usize = 32;
const PEER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// 页面侧发往后台的请求。
#[derive(Debug, Clone)]
pub enum PeerRequest {
    /// 请求后台以不受限的网络环境抓取图片，返回 Data URL。
    FetchImage { image_url: String },
    /// 请求后台在它自己的上下文里尝试写剪贴板。
    WriteImageToClipboard { image_data_url: String },
    /// 存活信号：页面侧已就绪。只发不等。
    ContentScriptReady,
}

/// 后台返回的成功响应。
#[derive(Debug, Clone)]
pub enum PeerResponse {
    FetchImage { data_url: String },
    WriteImage,
}

/// 对端调用失败分类。
#[derive(Debug, Clone)]
pub enum PeerCallError {
    /// 传输层失败：通道关闭、无监听者或等待超时。
    Unreachable(String),
    /// 对端收到了请求但业务执行失败，携带对端的错误描述。
    Rejected(String),
}

struct Envelope {
    id: u64,
    request: PeerRequest,
    reply: Option<oneshot::Sender<Result<PeerResponse, String>>>,
}

/// 页面侧的对端句柄。克隆开销低，可在各阶段间共享。
#[derive(Clone)]
pub struct PeerHandle {
    tx: mpsc::Sender<Envelope>,
    next_id: Arc<AtomicU64>,
    call_timeout: Duration,
    ready: Arc<AtomicU64>,
}

impl PeerHandle {
    /// 一问一答调用。返回前要么拿到响应，要么在超时/通道关闭时失败。
    pub async fn call(&self, request: PeerRequest) -> Result<PeerResponse, PeerCallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();

        let envelope = Envelope {
            id,
            request,
            reply: Some(reply_tx),
        };

        self.tx.send(envelope).await.map_err(|_| {
            PeerCallError::Unreachable("消息通道已关闭，后台上下文不可达".to_string())
        })?;

        let outcome = tokio::time::timeout(self.call_timeout, reply_rx)
            .await
            .map_err(|_| {
                PeerCallError::Unreachable(format!(
                    "等待对端响应超时（{}ms, id={}）",
                    self.call_timeout.as_millis(),
                    id
                ))
            })?;

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(message)) => Err(PeerCallError::Rejected(message)),
            Err(_) => Err(PeerCallError::Unreachable(format!(
                "对端在响应前丢弃了请求（id={}）",
                id
            ))),
        }
    }

    /// 只发不等的存活/通知消息。发送失败只记日志，不阻断调用方。
    pub async fn notify(&self, request: PeerRequest) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = Envelope {
            id,
            request,
            reply: None,
        };

        if self.tx.send(envelope).await.is_err() {
            log::debug!("📪 通知消息未送达（id={}），后台上下文不可达", id);
        }
    }

    /// 当前已上报就绪的页面上下文数。服务循环退出时归零。
    pub fn ready_contexts(&self) -> u64 {
        self.ready.load(Ordering::Relaxed)
    }
}

/// 特权后台上下文服务。
pub struct BackgroundPeer {
    config: CaptureConfig,
    client: reqwest::Client,
    ready: Arc<AtomicU64>,
}

impl BackgroundPeer {
    /// 启动后台服务循环，返回页面侧句柄。
    pub fn spawn(config: CaptureConfig) -> Result<PeerHandle, CaptureError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .user_agent(PEER_USER_AGENT)
            .build()
            .map_err(|e| CaptureError::Channel(format!("无法创建后台 HTTP 客户端：{}", e)))?;

        let call_timeout = Duration::from_millis(config.peer_call_timeout_ms);
        let (tx, rx) = mpsc::channel(PEER_CHANNEL_CAPACITY);
        let ready = Arc::new(AtomicU64::new(0));

        let peer = Self {
            config,
            client,
            ready: ready.clone(),
        };
        tokio::spawn(peer.serve(rx));

        Ok(PeerHandle {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
            call_timeout,
            ready,
        })
    }

    async fn serve(self, mut rx: mpsc::Receiver<Envelope>) {
        log::info!("🛰️ 后台上下文已启动");

        while let Some(envelope) = rx.recv().await {
            let Envelope { id, request, reply } = envelope;

            match request {
                PeerRequest::ContentScriptReady => {
                    let count = self.ready.fetch_add(1, Ordering::Relaxed) + 1;
                    log::info!("📡 页面上下文就绪（id={}，就绪数={}）", id, count);
                }
                PeerRequest::FetchImage { image_url } => {
                    let result = self.fetch_image(&image_url).await;
                    Self::respond(id, reply, result);
                }
                PeerRequest::WriteImageToClipboard { image_data_url } => {
                    let result = self.write_image(&image_data_url).await;
                    Self::respond(id, reply, result);
                }
            }
        }

        // 通道关闭即所有页面侧句柄消失，就绪记录随之作废。
        let dropped = self.ready.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            log::info!("📪 通道关闭，丢弃 {} 个就绪上下文", dropped);
        }
        log::info!("🛰️ 后台上下文已退出");
    }

    fn respond(
        id: u64,
        reply: Option<oneshot::Sender<Result<PeerResponse, String>>>,
        result: Result<PeerResponse, String>,
    ) {
        let Some(reply) = reply else {
            log::debug!("请求未附带响应通道（id={}），结果被丢弃", id);
            return;
        };

        if reply.send(result).is_err() {
            log::debug!("📪 响应未送达（id={}），调用方已放弃等待", id);
        }
    }

    /// 以后台网络环境抓取图片并编码为 Data URL。
    async fn fetch_image(&self, url: &str) -> Result<PeerResponse, String> {
        log::info!("🌐 后台代抓图片 - URL: {}", redact_url_for_log(url));

        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| format!("后台请求失败：{}", e))?;

        if !response.status().is_success() {
            return Err(format!("后台抓取失败：HTTP {}", response.status().as_u16()));
        }

        if let Some(size) = response.content_length() {
            if size > self.config.max_file_size {
                return Err(format!(
                    "文件过大：{:.2} MB（限制：{:.2} MB）",
                    size as f64 / 1024.0 / 1024.0,
                    self.config.max_file_size as f64 / 1024.0 / 1024.0
                ));
            }
        }

        let mut buffer: Vec<u8> = Vec::new();
        let mut response = response;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| format!("后台下载中断：{}", e))?
        {
            if buffer.len() as u64 + chunk.len() as u64 > self.config.max_file_size {
                return Err("下载后文件超过大小限制".to_string());
            }
            buffer.extend_from_slice(&chunk);
        }

        let mime = infer::get(&buffer)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
            .map(|kind| kind.mime_type())
            .ok_or_else(|| "后台抓取内容不是图片".to_string())?;

        let data_url = format!(
            "data:{};base64,{}",
            mime,
            general_purpose::STANDARD.encode(&buffer)
        );

        log::debug!("✅ 后台代抓完成 - {} bytes", buffer.len());
        Ok(PeerResponse::FetchImage { data_url })
    }

    /// 在后台上下文尝试写剪贴板。部分平台此路不通，返回明确错误而不是挂起。
    async fn write_image(&self, image_data_url: &str) -> Result<PeerResponse, String> {
        if !self.config.peer_clipboard_enabled {
            return Err("后台上下文剪贴板能力已停用".to_string());
        }

        let bytes = parse_data_url_payload(image_data_url)?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| format!("后台解码图片失败：{}", e))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        let pixels = rgba.into_raw();

        tokio::task::spawn_blocking(move || {
            let mut clipboard = arboard::Clipboard::new()
                .map_err(|e| format!("后台无法访问剪贴板：{}", e))?;
            clipboard
                .set_image(arboard::ImageData {
                    width: width as usize,
                    height: height as usize,
                    bytes: std::borrow::Cow::Owned(pixels),
                })
                .map_err(|e| format!("后台写入剪贴板失败：{}", e))
        })
        .await
        .map_err(|e| format!("后台写入线程失败：{}", e))??;

        log::info!("✅ 后台剪贴板写入成功 - {}x{}", width, height);
        Ok(PeerResponse::WriteImage)
    }
}

/// 剥离 Data URL 头部并解码 base64 负载。
fn parse_data_url_payload(data_url: &str) -> Result<Vec<u8>, String> {
    let marker = ";base64,";
    let start = data_url
        .find(marker)
        .ok_or_else(|| "缺少 base64 标记".to_string())?;

    general_purpose::STANDARD
        .decode(&data_url[start + marker.len()..])
        .map_err(|e| format!("base64 解码失败：{}", e))
}

/// 日志里只保留 scheme/host/path，去掉可能携带令牌的查询串。
pub(crate) fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();

    format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
}
