//! # 页面快照模型
//!
//! ## 设计思路
//!
//! 定位器只需要宿主页面的一个只读视图：标签名、属性、计算样式中的背景图、
//! 序列化后的矢量子树与画布的像素表面。宿主页面随时可能改写 DOM，
//! 因此调用方每次触发捕获都应重新构造快照，而不是缓存旧引用。
//!
//! 这是外部协作者边界：由嵌入方（内容脚本宿主）负责从真实 DOM 填充。

use std::collections::BTreeMap;

/// 画布元素的渲染结果（相当于读取其像素表面）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelSurface {
    pub width: u32,
    pub height: u32,
    /// RGBA 字节（`width * height * 4`）。
    pub rgba: Vec<u8>,
}

/// 页面元素快照。
#[derive(Debug, Clone, Default)]
pub struct Element {
    tag: String,
    attrs: BTreeMap<String, String>,
    /// 计算样式中的 `background-image` 值，例如 `url("https://…/a.png")`。
    background_image: Option<String>,
    /// 子树的文本序列化结果（矢量元素使用）。
    markup: Option<String>,
    /// 像素表面（画布元素使用）。
    surface: Option<PixelSurface>,
    children: Vec<Element>,
}

impl Element {
    /// 创建元素快照。标签名统一转小写，与浏览器 `tagName` 的大小写差异解耦。
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn with_background_image(mut self, value: impl Into<String>) -> Self {
        self.background_image = Some(value.into());
        self
    }

    pub fn with_markup(mut self, markup: impl Into<String>) -> Self {
        self.markup = Some(markup.into());
        self
    }

    pub fn with_surface(mut self, surface: PixelSurface) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn background_image(&self) -> Option<&str> {
        self.background_image.as_deref()
    }

    pub fn markup(&self) -> Option<&str> {
        self.markup.as_deref()
    }

    pub fn surface(&self) -> Option<&PixelSurface> {
        self.surface.as_ref()
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// 深度优先查找第一个指定标签的后代。
    pub fn find_descendant(&self, tag: &str) -> Option<&Element> {
        for child in &self.children {
            if child.tag == tag {
                return Some(child);
            }
            if let Some(found) = child.find_descendant(tag) {
                return Some(found);
            }
        }
        None
    }
}

/// 页面文档快照：宿主名 + 根元素 + 焦点状态。
///
/// 焦点状态对应浏览器 `document.hasFocus()`，剪贴板直写策略依赖它。
#[derive(Debug, Clone)]
pub struct Document {
    host: String,
    root: Element,
    focused: bool,
}

impl Document {
    pub fn new(host: impl Into<String>, root: Element) -> Self {
        Self {
            host: host.into(),
            root,
            focused: true,
        }
    }

    pub fn with_focus(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn has_focus(&self) -> bool {
        self.focused
    }
}
