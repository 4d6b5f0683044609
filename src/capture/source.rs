//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“页面元素解析出的来源”和“流水线中间结果”解耦：
//! - `ImageReference` 表示定位阶段产出的来源语义（构造后不可变）
//! - `RawImageBytes` 表示已抓取但未规范化的编码字节
//! - `RasterImage` 表示已规范化、可写入剪贴板/入队的位图

use base64::{Engine as _, engine::general_purpose};

/// 图片来源引用。由定位器产出，抓取器消费。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    /// 远程地址来源。
    Url(String),
    /// 内联 Data URL（`data:image/...;base64,...`）。
    DataUri(String),
    /// 内联像素缓冲（画布元素的渲染结果）。
    Pixels {
        width: u32,
        height: u32,
        /// RGBA 字节（`width * height * 4`）。
        rgba: Vec<u8>,
    },
}

impl ImageReference {
    /// 用于日志与入队记录的来源描述。像素缓冲没有地址，用固定占位。
    pub fn describe(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::DataUri(_) => "<data-uri>".to_string(),
            Self::Pixels { width, height, .. } => format!("<canvas {}x{}>", width, height),
        }
    }
}

/// 抓取阶段输出：原始编码字节与来源标识。
pub(crate) struct RawImageBytes {
    /// 原始图片字节（任意受支持格式）。
    pub(crate) bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 规范化阶段输出：统一编码后的位图。
///
/// 主图固定为 PNG；缩略图为 JPEG。`mime` 字段随编码方式标注。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    /// 编码后的图片字节。
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl RasterImage {
    /// 输出 Data URL 形式，供持久化与跨上下文消息使用。
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_carries_mime_and_base64_payload() {
        let image = RasterImage {
            width: 1,
            height: 1,
            bytes: vec![1, 2, 3],
            mime: "image/png",
        };

        assert_eq!(image.to_data_url(), "data:image/png;base64,AQID");
    }

    #[test]
    fn describe_redacts_inline_payloads() {
        let reference = ImageReference::DataUri("data:image/png;base64,AQID".to_string());
        assert_eq!(reference.describe(), "<data-uri>");

        let pixels = ImageReference::Pixels {
            width: 8,
            height: 4,
            rgba: vec![0; 128],
        };
        assert_eq!(pixels.describe(), "<canvas 8x4>");
    }
}
