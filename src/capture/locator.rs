//! # 图片定位模块
//!
//! ## 设计思路
//!
//! 页面里“看起来是一张图”的东西在 DOM 上形态各异：普通图片元素、CSS 背景图、
//! 矢量子树、画布、响应式分组、懒加载占位等。定位器把这些异构形态统一解析为
//! `ImageReference`，按固定优先级取第一个命中的形态，完全无副作用。
//!
//! ## 实现思路
//!
//! 优先级固定为：img → 背景图 → svg → canvas → 嵌套 img → picture → 懒加载属性。
//! 每个形态一个私有函数，主入口只负责按序串联。

use base64::{Engine as _, engine::general_purpose};
use once_cell::sync::Lazy;
use regex::Regex;

use super::handler::CaptureHandler;
use super::source::ImageReference;
use crate::dom::Element;

/// 从 CSS `background-image` 计算值中提取第一层 `url(...)` 地址。
static CSS_URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\(['"]?([^'")]+)['"]?\)"#).expect("css url 正则非法"));

/// 懒加载图片常见的数据属性，按惯用度排序。
const LAZY_SOURCE_ATTRS: [&str; 3] = ["data-src", "data-original", "data-lazy-src"];

impl CaptureHandler {
    /// 从元素快照推导图片来源。无法推导时返回 `None`。
    pub fn locate_image(element: &Element) -> Option<ImageReference> {
        Self::from_img(element)
            .or_else(|| Self::from_background(element))
            .or_else(|| Self::from_svg(element))
            .or_else(|| Self::from_canvas(element))
            .or_else(|| Self::from_nested_img(element))
            .or_else(|| Self::from_picture(element))
            .or_else(|| Self::from_lazy_attrs(element))
    }

    /// 形态 1：普通图片元素。
    fn from_img(element: &Element) -> Option<ImageReference> {
        if element.tag() != "img" {
            return None;
        }
        element.attr("src").map(Self::classify_source)
    }

    /// 形态 2：CSS 背景图。渐变等非 url 图层不命中。
    fn from_background(element: &Element) -> Option<ImageReference> {
        let value = element.background_image()?;
        if value == "none" {
            return None;
        }

        CSS_URL_PATTERN
            .captures(value)
            .and_then(|caps| caps.get(1))
            .map(|m| Self::classify_source(m.as_str()))
    }

    /// 形态 3：矢量子树。序列化文本按 UTF-8 做 base64，保证任意字符安全。
    fn from_svg(element: &Element) -> Option<ImageReference> {
        if element.tag() != "svg" {
            return None;
        }

        let markup = element.markup()?;
        let encoded = general_purpose::STANDARD.encode(markup.as_bytes());
        Some(ImageReference::DataUri(format!(
            "data:image/svg+xml;base64,{}",
            encoded
        )))
    }

    /// 形态 4：画布元素，取其像素表面。
    fn from_canvas(element: &Element) -> Option<ImageReference> {
        if element.tag() != "canvas" {
            return None;
        }

        let surface = element.surface()?;
        Some(ImageReference::Pixels {
            width: surface.width,
            height: surface.height,
            rgba: surface.rgba.clone(),
        })
    }

    /// 形态 5：容器内嵌套的第一个图片后代（图片社区常见包装结构）。
    fn from_nested_img(element: &Element) -> Option<ImageReference> {
        element
            .find_descendant("img")
            .and_then(|img| img.attr("src"))
            .map(Self::classify_source)
    }

    /// 形态 6：响应式分组，优先嵌套 img，否则取第一个 source 的首个候选。
    fn from_picture(element: &Element) -> Option<ImageReference> {
        if element.tag() != "picture" {
            return None;
        }

        if let Some(src) = element.find_descendant("img").and_then(|img| img.attr("src")) {
            return Some(Self::classify_source(src));
        }

        let srcset = element.find_descendant("source")?.attr("srcset")?;
        srcset
            .split_whitespace()
            .next()
            .map(Self::classify_source)
    }

    /// 形态 7：懒加载属性约定。
    fn from_lazy_attrs(element: &Element) -> Option<ImageReference> {
        LAZY_SOURCE_ATTRS
            .iter()
            .find_map(|name| element.attr(name))
            .map(Self::classify_source)
    }

    /// 区分内联 Data URL 与远程地址。
    fn classify_source(src: &str) -> ImageReference {
        if src.starts_with("data:") {
            ImageReference::DataUri(src.to_string())
        } else {
            ImageReference::Url(src.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::PixelSurface;

    #[test]
    fn img_src_resolves_to_url() {
        let element = Element::new("img").with_attr("src", "https://site/a.png");

        assert_eq!(
            CaptureHandler::locate_image(&element),
            Some(ImageReference::Url("https://site/a.png".to_string()))
        );
    }

    #[test]
    fn img_data_src_resolves_to_data_uri() {
        let element = Element::new("img").with_attr("src", "data:image/png;base64,AQID");

        assert!(matches!(
            CaptureHandler::locate_image(&element),
            Some(ImageReference::DataUri(_))
        ));
    }

    #[test]
    fn background_image_url_is_extracted() {
        let element =
            Element::new("div").with_background_image(r#"url("https://site/bg.jpg")"#);

        assert_eq!(
            CaptureHandler::locate_image(&element),
            Some(ImageReference::Url("https://site/bg.jpg".to_string()))
        );
    }

    #[test]
    fn gradient_background_does_not_match() {
        let element = Element::new("div")
            .with_background_image("linear-gradient(rgb(0, 0, 0), rgb(255, 255, 255))");

        assert_eq!(CaptureHandler::locate_image(&element), None);
    }

    #[test]
    fn svg_markup_becomes_base64_data_uri() {
        let markup = r#"<svg xmlns="http://www.w3.org/2000/svg"><circle r="5"/></svg>"#;
        let element = Element::new("svg").with_markup(markup);

        let located = CaptureHandler::locate_image(&element).expect("svg not located");
        let ImageReference::DataUri(uri) = located else {
            panic!("expected data uri");
        };

        let payload = uri
            .strip_prefix("data:image/svg+xml;base64,")
            .expect("missing svg data uri prefix");
        let decoded = general_purpose::STANDARD.decode(payload).expect("bad base64");
        assert_eq!(decoded, markup.as_bytes());
    }

    #[test]
    fn canvas_surface_becomes_pixel_reference() {
        let element = Element::new("canvas").with_surface(PixelSurface {
            width: 2,
            height: 1,
            rgba: vec![255, 0, 0, 255, 0, 255, 0, 255],
        });

        assert!(matches!(
            CaptureHandler::locate_image(&element),
            Some(ImageReference::Pixels { width: 2, height: 1, .. })
        ));
    }

    #[test]
    fn nested_img_in_container_is_found() {
        let element = Element::new("div")
            .with_child(Element::new("span"))
            .with_child(Element::new("img").with_attr("src", "https://site/nested.png"));

        assert_eq!(
            CaptureHandler::locate_image(&element),
            Some(ImageReference::Url("https://site/nested.png".to_string()))
        );
    }

    #[test]
    fn picture_prefers_img_then_first_srcset_candidate() {
        let with_img = Element::new("picture")
            .with_child(Element::new("source").with_attr("srcset", "https://site/s.webp 1x"))
            .with_child(Element::new("img").with_attr("src", "https://site/p.png"));
        assert_eq!(
            CaptureHandler::locate_image(&with_img),
            Some(ImageReference::Url("https://site/p.png".to_string()))
        );

        let source_only = Element::new("picture")
            .with_child(Element::new("source").with_attr("srcset", "https://site/s.webp 1x"));
        assert_eq!(
            CaptureHandler::locate_image(&source_only),
            Some(ImageReference::Url("https://site/s.webp".to_string()))
        );
    }

    #[test]
    fn lazy_attrs_are_probed_in_order() {
        let element = Element::new("div")
            .with_attr("data-lazy-src", "https://site/lazy.png")
            .with_attr("data-src", "https://site/preferred.png");

        assert_eq!(
            CaptureHandler::locate_image(&element),
            Some(ImageReference::Url("https://site/preferred.png".to_string()))
        );
    }

    #[test]
    fn plain_element_yields_none() {
        let element = Element::new("p").with_attr("class", "text");

        assert_eq!(CaptureHandler::locate_image(&element), None);
    }
}
