//! # 抓取模块
//!
//! ## 设计思路
//!
//! 页面上下文的网络能力受同源策略约束，抓取因此是一条级联：先走零成本的
//! 内联解码，再尝试本上下文直连，失败后委托特权对端代抓，最后落到
//! “带缓存穿透参数重新拉取并立即渲染读回”的兜底路径。
//!
//! 级联内每一步的失败都在尝试边界吞掉并记录日志——直连被拒是预期情况，
//! 不算硬错误；只有全部路径耗尽才向编排层返回 `Fetch` 错误。
//! 对端不可达（通道关闭、无监听者）是独立的失败形态，同样只消耗一步。

use base64::{Engine as _, engine::general_purpose};

use super::handler::CaptureHandler;
use super::source::{ImageReference, RawImageBytes};
use super::{CaptureConfig, CaptureError};
use crate::peer::{self, PeerCallError, PeerRequest, PeerResponse};

impl CaptureHandler {
    /// 将来源引用解析为原始图片字节。所有策略耗尽时返回 `Fetch` 错误。
    pub(crate) async fn fetch_bytes(
        &self,
        reference: &ImageReference,
        config: &CaptureConfig,
    ) -> Result<RawImageBytes, CaptureError> {
        // 内联来源没有网络步骤，直接解码返回。
        match reference {
            ImageReference::DataUri(data) => return Self::load_inline(data, config),
            ImageReference::Pixels { width, height, rgba } => {
                let bytes = Self::encode_rgba_png(*width, *height, rgba)?;
                return Ok(RawImageBytes {
                    bytes,
                    source_hint: "canvas",
                });
            }
            ImageReference::Url(_) => {}
        }

        let ImageReference::Url(url) = reference else {
            unreachable!("inline variants handled above");
        };

        let mut last_err: Option<String> = None;

        // 第 1 跳：本上下文直连（不带凭据，非 2xx 快速失败）。
        match self.fetch_direct(url, config).await {
            Ok(bytes) => {
                return Ok(RawImageBytes {
                    bytes,
                    source_hint: "direct",
                });
            }
            Err(err) => {
                log::debug!("直连抓取未成功，改走后台代抓：{}", err);
                last_err = Some(err);
            }
        }

        // 第 2 跳：委托对端上下文代抓。通道不可达与对端拒绝都只消耗这一步。
        match self
            .peer()
            .call(PeerRequest::FetchImage {
                image_url: url.clone(),
            })
            .await
        {
            Ok(PeerResponse::FetchImage { data_url }) => {
                let bytes = Self::parse_data_url(&data_url, config.max_file_size)?;
                return Ok(RawImageBytes {
                    bytes,
                    source_hint: "peer",
                });
            }
            Ok(other) => {
                log::warn!("⚠️ 对端返回了意外响应：{:?}", other);
                last_err = Some("对端返回了意外响应".to_string());
            }
            Err(PeerCallError::Unreachable(msg)) => {
                log::warn!("⚠️ 对端上下文不可达，进入渲染兜底：{}", msg);
                last_err = Some(msg);
            }
            Err(PeerCallError::Rejected(msg)) => {
                log::warn!("⚠️ 对端代抓失败，进入渲染兜底：{}", msg);
                last_err = Some(msg);
            }
        }

        // 第 3 跳：带缓存穿透参数重新拉取并立即渲染读回。
        // 渲染表面被污染时读回会抛安全错误，这里表现为解码失败，同样吞掉。
        match self.fetch_rendered(url, config).await {
            Ok(bytes) => {
                return Ok(RawImageBytes {
                    bytes,
                    source_hint: "render",
                });
            }
            Err(err) => {
                log::warn!("⚠️ 渲染兜底失败：{}", err);
                last_err = Some(err);
            }
        }

        Err(CaptureError::Fetch(
            last_err.unwrap_or_else(|| "所有抓取策略均已耗尽".to_string()),
        ))
    }

    /// 内联 Data URL 解码。矢量负载不做签名校验，解码失败留给规范化阶段。
    fn load_inline(data: &str, config: &CaptureConfig) -> Result<RawImageBytes, CaptureError> {
        log::debug!("📝 处理内联图片数据");
        let bytes = Self::parse_data_url(data, config.max_file_size)?;

        if !data.starts_with("data:image/svg+xml") {
            Self::validate_image_signature(&bytes)?;
        }

        Ok(RawImageBytes {
            bytes,
            source_hint: "inline",
        })
    }

    /// 本上下文直连抓取。失败是预期路径，错误以字符串返回给级联记录。
    async fn fetch_direct(&self, url: &str, config: &CaptureConfig) -> Result<Vec<u8>, String> {
        log::debug!("🌐 直连抓取 - URL: {}", peer::redact_url_for_log(url));

        let response = self
            .page_client()
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| format!("请求失败：{}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status().as_u16()));
        }

        let bytes = Self::read_capped_body(response, config.max_file_size).await?;
        Self::validate_image_signature(&bytes).map_err(|e| e.to_string())?;
        Ok(bytes)
    }

    /// 渲染兜底：缓存穿透参数 + 拉取 + 解码读回 + PNG 重编码。
    async fn fetch_rendered(&self, url: &str, config: &CaptureConfig) -> Result<Vec<u8>, String> {
        let separator = if url.contains('?') { '&' } else { '?' };
        let busted = format!(
            "{}{}cachebuster={}",
            url,
            separator,
            chrono::Utc::now().timestamp_millis()
        );
        log::debug!("🖼️ 渲染兜底抓取 - URL: {}", peer::redact_url_for_log(&busted));

        let response = self
            .page_client()
            .get(&busted)
            .header(reqwest::header::ACCEPT, "image/*,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| format!("请求失败：{}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status().as_u16()));
        }

        let bytes = Self::read_capped_body(response, config.max_file_size).await?;

        // “渲染读回”：解码到像素表面再重编码。解码失败视同污染表面的安全错误。
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| format!("渲染表面读回失败：{}", e))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();

        Self::encode_rgba_png(width, height, rgba.as_raw()).map_err(|e| e.to_string())
    }

    /// 带体积上限的响应体读取。
    async fn read_capped_body(
        response: reqwest::Response,
        max_file_size: u64,
    ) -> Result<Vec<u8>, String> {
        if let Some(size) = response.content_length() {
            if size > max_file_size {
                return Err(format!(
                    "文件过大：{:.2} MB（限制：{:.2} MB）",
                    size as f64 / 1024.0 / 1024.0,
                    max_file_size as f64 / 1024.0 / 1024.0
                ));
            }
        }

        let mut buffer: Vec<u8> = Vec::new();
        let mut response = response;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| format!("下载失败：{}", e))?
        {
            if buffer.len() as u64 + chunk.len() as u64 > max_file_size {
                return Err("下载后文件超过大小限制".to_string());
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer)
    }

    /// 解析 Data URL / 纯 Base64 输入，解码前先按长度估算拒绝超限负载。
    pub(crate) fn parse_data_url(data: &str, max_file_size: u64) -> Result<Vec<u8>, CaptureError> {
        let normalized = data.trim();

        let payload = if normalized.starts_with("data:") {
            let marker = ";base64,";
            let start = normalized
                .find(marker)
                .ok_or_else(|| CaptureError::Decode("缺少 base64 标记".to_string()))?;
            &normalized[start + marker.len()..]
        } else {
            normalized
        };

        let estimated = Self::estimate_base64_decoded_len(payload)?;
        if estimated > max_file_size {
            return Err(CaptureError::ResourceLimit(format!(
                "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| CaptureError::Decode(format!("Base64 解码失败：{}", e)))
    }

    fn estimate_base64_decoded_len(payload: &str) -> Result<u64, CaptureError> {
        let len = payload.trim().len() as u64;
        let groups = len
            .checked_add(3)
            .ok_or_else(|| CaptureError::ResourceLimit("Base64 输入长度溢出".to_string()))?
            / 4;

        groups
            .checked_mul(3)
            .ok_or_else(|| CaptureError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
    }

    /// 通过文件签名（magic bytes）校验输入是否为图片。
    pub(crate) fn validate_image_signature(bytes: &[u8]) -> Result<(), CaptureError> {
        if bytes.is_empty() {
            return Err(CaptureError::Decode("图片内容为空".to_string()));
        }

        let kind = infer::get(bytes)
            .ok_or_else(|| CaptureError::Decode("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(CaptureError::Decode(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::test_support::{spawn_handler, tiny_png_bytes};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn serve_responses(
        responses: Vec<(u16, &'static str, Vec<u8>)>,
    ) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let port = listener.local_addr().expect("read local addr failed").port();

        let handle = thread::spawn(move || {
            for (status, content_type, body) in responses {
                let (mut stream, _) = listener.accept().expect("accept failed");
                let mut req_buf = [0u8; 2048];
                let _ = stream.read(&mut req_buf);

                let header = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    content_type,
                    body.len()
                );
                stream.write_all(header.as_bytes()).expect("write headers failed");
                stream.write_all(&body).expect("write body failed");
                stream.flush().expect("flush failed");
            }
        });

        (port, handle)
    }

    #[tokio::test]
    async fn inline_data_uri_skips_network() {
        let handler = spawn_handler().await;
        let config = CaptureConfig::default();
        let png = tiny_png_bytes();
        let data_url = format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(&png)
        );

        let raw = handler
            .fetch_bytes(&ImageReference::DataUri(data_url), &config)
            .await
            .expect("inline fetch failed");

        assert_eq!(raw.source_hint, "inline");
        assert_eq!(raw.bytes, png);
    }

    #[tokio::test]
    async fn direct_fetch_succeeds_on_first_hop() {
        let (port, server) = serve_responses(vec![(200, "image/png", tiny_png_bytes())]);
        let handler = spawn_handler().await;
        let config = CaptureConfig::default();
        let url = format!("http://127.0.0.1:{}/a.png", port);

        let raw = handler
            .fetch_bytes(&ImageReference::Url(url), &config)
            .await
            .expect("direct fetch failed");
        server.join().expect("server thread failed");

        assert_eq!(raw.source_hint, "direct");
    }

    #[tokio::test]
    async fn peer_hop_kicks_in_after_direct_rejection() {
        // 第一跳 403，第二跳（后台代抓）命中。
        let (port, server) = serve_responses(vec![
            (403, "text/plain", b"denied".to_vec()),
            (200, "image/png", tiny_png_bytes()),
        ]);
        let handler = spawn_handler().await;
        let config = CaptureConfig::default();
        let url = format!("http://127.0.0.1:{}/a.png", port);

        let raw = handler
            .fetch_bytes(&ImageReference::Url(url), &config)
            .await
            .expect("peer fetch failed");
        server.join().expect("server thread failed");

        assert_eq!(raw.source_hint, "peer");
    }

    #[tokio::test]
    async fn render_hop_appends_cachebuster() {
        // 直连与后台均失败，第三跳（渲染兜底）成功。
        let (port, server) = serve_responses(vec![
            (404, "text/plain", b"missing".to_vec()),
            (404, "text/plain", b"missing".to_vec()),
            (200, "image/png", tiny_png_bytes()),
        ]);
        let handler = spawn_handler().await;
        let config = CaptureConfig::default();
        let url = format!("http://127.0.0.1:{}/a.png?w=1", port);

        let raw = handler
            .fetch_bytes(&ImageReference::Url(url), &config)
            .await
            .expect("render fetch failed");
        server.join().expect("server thread failed");

        assert_eq!(raw.source_hint, "render");
        // 读回路径固定重编码为 PNG。
        assert!(image::load_from_memory(&raw.bytes).is_ok());
    }

    #[tokio::test]
    async fn exhausted_cascade_yields_fetch_error() {
        let handler = spawn_handler().await;
        let config = CaptureConfig::default();
        // 无监听端口：三跳全部失败。
        let url = "http://127.0.0.1:1/void.png".to_string();

        let result = handler
            .fetch_bytes(&ImageReference::Url(url), &config)
            .await;

        assert!(matches!(result, Err(CaptureError::Fetch(_))));
    }

    #[test]
    fn oversized_base64_is_rejected_before_decode() {
        let huge = "A".repeat(1024 * 1024);
        let result = CaptureHandler::parse_data_url(&huge, 32);

        assert!(matches!(result, Err(CaptureError::ResourceLimit(_))));
    }

    #[test]
    fn signature_check_rejects_non_image_payload() {
        let result = CaptureHandler::validate_image_signature(b"<html>nope</html>");

        assert!(matches!(result, Err(CaptureError::Decode(_))));
    }
}
