//! # 规范化模块
//!
//! ## 设计思路
//!
//! 下游（剪贴板、队列、缩略图）只消费一种格式：不透明 PNG。规范化阶段把
//! 任意来源的字节统一解码，平铺到白色底上去除透明通道，再确定性重编码。
//! 已规范化的输入再次进入本阶段必须得到逐字节相同的输出。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸
//! 2. 按像素与内存上限快速拒绝
//! 3. 完整解码，二次校验实际尺寸
//! 4. 白底平铺为 RGB，重编码 PNG
//!
//! 缩略图走同一条解码通道，降采样优先 fast_image_resize，失败回退 image。

use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageBuffer, ImageEncoder, Rgb, RgbImage};
use std::io::Cursor;

use super::handler::CaptureHandler;
use super::source::{RasterImage, RawImageBytes};
use super::{CaptureConfig, CaptureError};

impl CaptureHandler {
    /// 将原始字节规范化为不透明 PNG。对已规范化的输入幂等。
    pub(crate) fn normalize(
        &self,
        raw: &RawImageBytes,
        config: &CaptureConfig,
    ) -> Result<RasterImage, CaptureError> {
        image::guess_format(&raw.bytes)
            .map_err(|e| CaptureError::Decode(format!("不支持的图片格式：{}", e)))?;

        let (header_width, header_height) = Self::inspect_dimensions_from_memory(&raw.bytes)?;
        Self::validate_pixel_limits(config, header_width, header_height)?;
        Self::validate_decoded_memory_limits(config, header_width, header_height)?;

        let decoded = image::load_from_memory(&raw.bytes)
            .map_err(|e| CaptureError::Decode(format!("图片解码失败：{}", e)))?;

        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::validate_pixel_limits(config, width, height)?;
        Self::validate_decoded_memory_limits(config, width, height)?;

        let flattened = Self::flatten_onto_white(&rgba);
        let bytes = Self::encode_rgb_png(&flattened)?;

        log::info!(
            "✅ 图片规范化完成 - 来源: {} 尺寸: {}x{} 输出: {} 字节",
            raw.source_hint,
            width,
            height,
            bytes.len()
        );

        Ok(RasterImage {
            width,
            height,
            bytes,
            mime: "image/png",
        })
    }

    /// 从规范化结果生成 JPEG 缩略图，长边不超过配置上限，比例保持。
    pub(crate) fn make_thumbnail(
        &self,
        canonical: &RasterImage,
        config: &CaptureConfig,
    ) -> Result<RasterImage, CaptureError> {
        let decoded = image::load_from_memory(&canonical.bytes)
            .map_err(|e| CaptureError::Decode(format!("缩略图源解码失败：{}", e)))?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();

        let larger = width.max(height);
        let (target_width, target_height) = if larger <= config.thumbnail_max_dimension {
            (width, height)
        } else {
            let scale = config.thumbnail_max_dimension as f64 / larger as f64;
            (
                ((width as f64 * scale).round() as u32).max(1),
                ((height as f64 * scale).round() as u32).max(1),
            )
        };

        let resized = if (target_width, target_height) == (width, height) {
            rgb
        } else {
            match Self::resize_with_fast_image_resize(&rgb, target_width, target_height) {
                Ok(resized) => resized,
                Err(err) => {
                    log::warn!("⚠️ fast_image_resize 降采样失败，回退 image::thumbnail：{}", err);
                    image::imageops::thumbnail(&rgb, target_width, target_height)
                }
            }
        };

        let mut buffer = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buffer, config.thumbnail_jpeg_quality)
            .write_image(
                resized.as_raw(),
                target_width,
                target_height,
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| CaptureError::Decode(format!("缩略图编码失败：{}", e)))?;

        Ok(RasterImage {
            width: target_width,
            height: target_height,
            bytes: buffer.into_inner(),
            mime: "image/jpeg",
        })
    }

    /// 将 RGBA 像素编码为 PNG（抓取阶段的像素表面入口）。
    pub(crate) fn encode_rgba_png(
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<Vec<u8>, CaptureError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| CaptureError::ResourceLimit("图片尺寸导致内存溢出风险".to_string()))?;
        if rgba.len() != expected {
            return Err(CaptureError::Decode("像素缓冲长度与尺寸不符".to_string()));
        }

        let mut buffer = Cursor::new(Vec::new());
        PngEncoder::new(&mut buffer)
            .write_image(rgba, width, height, ExtendedColorType::Rgba8)
            .map_err(|e| CaptureError::Decode(format!("PNG 编码失败：{}", e)))?;

        Ok(buffer.into_inner())
    }

    /// 仅通过内存中的图片头信息读取宽高，用于完整解码前的限制检查。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), CaptureError> {
        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CaptureError::Decode(format!("无法识别图片格式：{}", e)))?;

        reader
            .into_dimensions()
            .map_err(|e| CaptureError::Decode(format!("无法读取图片尺寸：{}", e)))
    }

    fn validate_pixel_limits(
        config: &CaptureConfig,
        width: u32,
        height: u32,
    ) -> Result<(), CaptureError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| CaptureError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > config.max_decoded_pixels {
            return Err(CaptureError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    fn validate_decoded_memory_limits(
        config: &CaptureConfig,
        width: u32,
        height: u32,
    ) -> Result<(), CaptureError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| CaptureError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > config.max_decoded_bytes {
            return Err(CaptureError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    /// 半透明像素与白色底按 alpha 混合；不透明输入原样通过，保证幂等。
    fn flatten_onto_white(rgba: &image::RgbaImage) -> RgbImage {
        let (width, height) = rgba.dimensions();
        let mut out = RgbImage::new(width, height);

        for (x, y, pixel) in rgba.enumerate_pixels() {
            let [r, g, b, a] = pixel.0;
            let blend = |c: u8| -> u8 {
                ((c as u16 * a as u16 + 255 * (255 - a as u16)) / 255) as u8
            };
            out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
        }

        out
    }

    fn encode_rgb_png(rgb: &RgbImage) -> Result<Vec<u8>, CaptureError> {
        let (width, height) = rgb.dimensions();
        let mut buffer = Cursor::new(Vec::new());
        PngEncoder::new(&mut buffer)
            .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(|e| CaptureError::Decode(format!("PNG 编码失败：{}", e)))?;

        Ok(buffer.into_inner())
    }

    fn resize_with_fast_image_resize(
        rgb: &RgbImage,
        target_width: u32,
        target_height: u32,
    ) -> Result<RgbImage, CaptureError> {
        let (src_width, src_height) = rgb.dimensions();

        let src_image = fr::images::Image::from_vec_u8(
            src_width,
            src_height,
            rgb.as_raw().clone(),
            fr::PixelType::U8x3,
        )
        .map_err(|e| CaptureError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

        let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x3);

        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3));

        resizer
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| CaptureError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

        ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(target_width, target_height, dst_image.into_vec())
            .ok_or_else(|| CaptureError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
    }
}
