//! 粘贴编排模块
//!
//! # 设计思路
//!
//! 剪贴板写入完成后，把内容送进目标页面的输入框是一条固定的状态链：
//! 定位输入框 →（可选）插入模板文本 → 聚焦 → 触发粘贴 → 静置。
//! 每一步都可能因目标页面的 DOM 变化而失败，失败不自动重试——
//! 重试权留给用户（重新触发快捷键）。
//!
//! 目标页面的接入形态（真实 DOM、测试替身）通过 `PageAdapter` 与
//! `InputSurface` 抽象注入；粘贴触发通过 `PasteInvoker` 抽象注入，
//! 默认实现用系统级按键模拟发送 Ctrl+V / Cmd+V。
//!
//! # 实现思路
//!
//! - 输入框探测按选择器列表顺序进行，取第一个命中。
//! - 模板插入后必须派发输入事件并静置一小段时间：部分页面的响应式
//!   绑定异步处理输入，立刻粘贴会被吞掉。
//! - 粘贴命令返回 `true` 仅表示命令被接受，不保证内容落位，
//!   调用方据此选择提示文案。

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use enigo::{
    Direction::{Click, Press, Release},
    Enigo, Key, Keyboard, Settings,
};

use crate::capture::CaptureError;
use crate::error::AppError;

/// 输入框探测策略，按声明顺序尝试。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSelector {
    /// 按元素 id 精确匹配。
    ById(String),
    /// 按属性名值对匹配。
    ByAttribute { name: String, value: String },
    /// 可编辑元素 + 指定 class。
    EditableWithClass(String),
}

/// 聊天页输入框的默认探测顺序。
///
/// 顺序从精确到宽泛：id 精确命中 → `data-id` 属性命中 →
/// 可编辑的 ProseMirror 编辑器。不探测裸 contenteditable，
/// 否则页面上任意可编辑区域都会抢先命中。
pub fn default_input_selectors() -> Vec<InputSelector> {
    vec![
        InputSelector::ById("prompt-textarea".to_string()),
        InputSelector::ByAttribute {
            name: "data-id".to_string(),
            value: "prompt-textarea".to_string(),
        },
        InputSelector::EditableWithClass("ProseMirror".to_string()),
    ]
}

/// 粘贴模板预设。`text` 为空表示只贴图、不插入文本。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasteTemplate {
    pub name: &'static str,
    pub text: &'static str,
}

impl PasteTemplate {
    /// 预设对应的模板文本；空文本预设（只贴图）返回 `None`。
    pub fn template_text(&self) -> Option<&'static str> {
        if self.text.is_empty() {
            None
        } else {
            Some(self.text)
        }
    }
}

/// 内置模板预设表。面板未选中自定义提示词时从这里取模板。
pub const DEFAULT_PASTE_TEMPLATES: &[PasteTemplate] = &[
    PasteTemplate {
        name: "Default",
        text: "Please describe this image:",
    },
    PasteTemplate {
        name: "Detailed Analysis",
        text: "Please provide a detailed analysis of this image:",
    },
    PasteTemplate {
        name: "Just Image",
        text: "",
    },
];

/// 按名称查找模板预设。
pub fn find_paste_template(name: &str) -> Option<&'static PasteTemplate> {
    DEFAULT_PASTE_TEMPLATES.iter().find(|t| t.name == name)
}

/// 已定位的文本输入表面。
pub trait InputSurface {
    /// 覆盖写入内容（不是追加）。
    fn set_content(&mut self, text: &str) -> Result<(), AppError>;

    /// 派发合成输入事件，让页面的响应式绑定观察到变更。
    fn dispatch_input_event(&mut self) -> Result<(), AppError>;

    /// 显式聚焦。粘贴命令在无焦点目标上会被拒绝。
    fn focus(&mut self) -> Result<(), AppError>;
}

/// 目标页面接入点：按选择器定位输入表面。
pub trait PageAdapter {
    fn locate_input(&mut self, selectors: &[InputSelector]) -> Option<&mut dyn InputSurface>;
}

pub type InvokeFuture<'a> = Pin<Box<dyn Future<Output = Result<bool, AppError>> + Send + 'a>>;

/// 粘贴命令触发器。返回的 `bool` 表示命令是否被接受。
pub trait PasteInvoker: Send + Sync {
    fn invoke(&self) -> InvokeFuture<'_>;
}

/// 系统级按键模拟触发器：发送平台对应的粘贴组合键。
pub struct SystemPasteInvoker;

impl PasteInvoker for SystemPasteInvoker {
    fn invoke(&self) -> InvokeFuture<'_> {
        Box::pin(async {
            tokio::task::spawn_blocking(send_paste_chord)
                .await
                .map_err(|e| AppError::Input(format!("线程执行失败: {}", e)))?
        })
    }
}

fn send_paste_chord() -> Result<bool, AppError> {
    let mut enigo = Enigo::new(&Settings::default())
        .map_err(|e| AppError::Input(format!("初始化输入模拟失败: {}", e)))?;

    #[cfg(target_os = "macos")]
    {
        enigo
            .key(Key::Meta, Press)
            .and_then(|_| enigo.key(Key::Unicode('v'), Click))
            .and_then(|_| enigo.key(Key::Meta, Release))
            .map_err(|e| AppError::Input(format!("模拟粘贴按键失败: {}", e)))?;
    }
    #[cfg(not(target_os = "macos"))]
    {
        enigo
            .key(Key::Control, Press)
            .and_then(|_| enigo.key(Key::Unicode('v'), Click))
            .and_then(|_| enigo.key(Key::Control, Release))
            .map_err(|e| AppError::Input(format!("模拟粘贴按键失败: {}", e)))?;
    }

    Ok(true)
}

/// 自动粘贴目标主机白名单。匹配精确主机名或其子域。
#[derive(Debug, Clone)]
pub struct HostAllowlist {
    hosts: Vec<String>,
}

impl Default for HostAllowlist {
    fn default() -> Self {
        Self {
            hosts: vec!["chatgpt.com".to_string(), "chat.openai.com".to_string()],
        }
    }
}

impl HostAllowlist {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }

    pub fn allows(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.hosts.iter().any(|allowed| {
            host == *allowed || host.ends_with(&format!(".{}", allowed))
        })
    }
}

/// 粘贴编排器。
pub struct PasteOrchestrator {
    selectors: Vec<InputSelector>,
    settle_delay: Duration,
    invoker: Box<dyn PasteInvoker>,
}

impl PasteOrchestrator {
    pub fn new(
        selectors: Vec<InputSelector>,
        settle_delay_ms: u64,
        invoker: Box<dyn PasteInvoker>,
    ) -> Self {
        Self {
            selectors,
            settle_delay: Duration::from_millis(settle_delay_ms),
            invoker,
        }
    }

    /// 执行一次粘贴编排。返回粘贴命令是否被接受。
    ///
    /// 状态链：定位 →（可选）模板插入 → 聚焦 → 触发粘贴 → 静置。
    /// 失败不重试；找不到输入框返回 `NoTarget`。
    pub async fn paste(
        &self,
        page: &mut dyn PageAdapter,
        template: Option<&str>,
    ) -> Result<bool, AppError> {
        let target = page.locate_input(&self.selectors).ok_or_else(|| {
            AppError::Capture(CaptureError::NoTarget(
                "未在页面上找到可用的输入框".to_string(),
            ))
        })?;

        if let Some(text) = template {
            log::debug!("📝 插入模板文本（{} 字符）", text.len());
            target.set_content(&format!("{}\n\n", text))?;
            target.dispatch_input_event()?;
            // 页面的输入处理可能是异步的，静置后再粘贴。
            tokio::time::sleep(self.settle_delay).await;
        }

        target.focus()?;

        let accepted = self.invoker.invoke().await?;
        if accepted {
            log::info!("✅ 粘贴命令已接受");
        } else {
            log::warn!("⚠️ 粘贴命令被拒绝，需要用户手动粘贴");
        }

        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct MockInput {
        content: Option<String>,
        input_events: u32,
        focused: bool,
    }

    impl InputSurface for MockInput {
        fn set_content(&mut self, text: &str) -> Result<(), AppError> {
            self.content = Some(text.to_string());
            Ok(())
        }

        fn dispatch_input_event(&mut self) -> Result<(), AppError> {
            self.input_events += 1;
            Ok(())
        }

        fn focus(&mut self) -> Result<(), AppError> {
            self.focused = true;
            Ok(())
        }
    }

    struct MockPage {
        input: Option<MockInput>,
    }

    impl PageAdapter for MockPage {
        fn locate_input(&mut self, _selectors: &[InputSelector]) -> Option<&mut dyn InputSurface> {
            self.input.as_mut().map(|i| i as &mut dyn InputSurface)
        }
    }

    /// 按选择器精确匹配的页面替身：只命中声明过的表面，且按探测顺序取胜。
    struct ProbedPage {
        surfaces: Vec<(InputSelector, MockInput)>,
    }

    impl PageAdapter for ProbedPage {
        fn locate_input(&mut self, selectors: &[InputSelector]) -> Option<&mut dyn InputSurface> {
            for wanted in selectors {
                if let Some(idx) = self.surfaces.iter().position(|(s, _)| s == wanted) {
                    return Some(&mut self.surfaces[idx].1);
                }
            }
            None
        }
    }

    struct CountingInvoker {
        calls: Arc<AtomicU32>,
        accepted: bool,
    }

    impl PasteInvoker for CountingInvoker {
        fn invoke(&self) -> InvokeFuture<'_> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let accepted = self.accepted;
            Box::pin(async move { Ok(accepted) })
        }
    }

    fn orchestrator(accepted: bool) -> (PasteOrchestrator, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let orchestrator = PasteOrchestrator::new(
            default_input_selectors(),
            0,
            Box::new(CountingInvoker {
                calls: calls.clone(),
                accepted,
            }),
        );
        (orchestrator, calls)
    }

    #[tokio::test]
    async fn template_gets_trailing_newlines_and_input_event() {
        let (orchestrator, calls) = orchestrator(true);
        let mut page = MockPage {
            input: Some(MockInput::default()),
        };

        let accepted = orchestrator
            .paste(&mut page, Some("describe this image"))
            .await
            .expect("paste failed");

        assert!(accepted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let input = page.input.expect("input missing");
        assert_eq!(input.content.as_deref(), Some("describe this image\n\n"));
        assert_eq!(input.input_events, 1);
        assert!(input.focused);
    }

    #[tokio::test]
    async fn paste_without_template_skips_content_write() {
        let (orchestrator, _) = orchestrator(true);
        let mut page = MockPage {
            input: Some(MockInput::default()),
        };

        orchestrator
            .paste(&mut page, None)
            .await
            .expect("paste failed");

        let input = page.input.expect("input missing");
        assert_eq!(input.content, None);
        assert_eq!(input.input_events, 0);
        assert!(input.focused, "focus is unconditional");
    }

    #[tokio::test]
    async fn missing_input_yields_no_target_without_invoking_paste() {
        let (orchestrator, calls) = orchestrator(true);
        let mut page = MockPage { input: None };

        let result = orchestrator.paste(&mut page, Some("text")).await;

        assert!(matches!(
            result,
            Err(AppError::Capture(CaptureError::NoTarget(_)))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_command_is_reported_not_retried() {
        let (orchestrator, calls) = orchestrator(false);
        let mut page = MockPage {
            input: Some(MockInput::default()),
        };

        let accepted = orchestrator
            .paste(&mut page, None)
            .await
            .expect("paste failed");

        assert!(!accepted);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no automatic retry");
    }

    #[test]
    fn default_probe_order_targets_chat_input_variants() {
        let selectors = default_input_selectors();

        assert_eq!(
            selectors,
            vec![
                InputSelector::ById("prompt-textarea".to_string()),
                InputSelector::ByAttribute {
                    name: "data-id".to_string(),
                    value: "prompt-textarea".to_string(),
                },
                InputSelector::EditableWithClass("ProseMirror".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn probe_prefers_data_id_surface_over_prosemirror() {
        let (orchestrator, _) = orchestrator(true);
        // 页面同时存在 ProseMirror 编辑器与 data-id 输入框，
        // 且 ProseMirror 在页面顺序里排前：必须按探测顺序取 data-id。
        let mut page = ProbedPage {
            surfaces: vec![
                (
                    InputSelector::EditableWithClass("ProseMirror".to_string()),
                    MockInput::default(),
                ),
                (
                    InputSelector::ByAttribute {
                        name: "data-id".to_string(),
                        value: "prompt-textarea".to_string(),
                    },
                    MockInput::default(),
                ),
            ],
        };

        orchestrator
            .paste(&mut page, Some("caption"))
            .await
            .expect("paste failed");

        assert_eq!(page.surfaces[1].1.content.as_deref(), Some("caption\n\n"));
        assert_eq!(page.surfaces[0].1.content, None, "later probe must not win");
    }

    #[tokio::test]
    async fn bare_contenteditable_surface_is_not_probed() {
        let (orchestrator, calls) = orchestrator(true);
        let mut page = ProbedPage {
            surfaces: vec![(
                InputSelector::ByAttribute {
                    name: "contenteditable".to_string(),
                    value: "true".to_string(),
                },
                MockInput::default(),
            )],
        };

        let result = orchestrator.paste(&mut page, None).await;

        assert!(matches!(
            result,
            Err(AppError::Capture(CaptureError::NoTarget(_)))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn default_preset_text_gets_two_newline_suffix() {
        let (orchestrator, _) = orchestrator(true);
        let mut page = MockPage {
            input: Some(MockInput::default()),
        };

        let template = DEFAULT_PASTE_TEMPLATES[0]
            .template_text()
            .expect("default preset has text");
        orchestrator
            .paste(&mut page, Some(template))
            .await
            .expect("paste failed");

        let input = page.input.expect("input missing");
        assert_eq!(
            input.content.as_deref(),
            Some("Please describe this image:\n\n")
        );
    }

    #[test]
    fn just_image_preset_carries_no_template_text() {
        let preset = find_paste_template("Just Image").expect("preset missing");

        assert_eq!(preset.template_text(), None);
    }

    #[test]
    fn allowlist_matches_exact_host_and_subdomains() {
        let allowlist = HostAllowlist::default();

        assert!(allowlist.allows("chatgpt.com"));
        assert!(allowlist.allows("chat.openai.com"));
        assert!(allowlist.allows("www.chatgpt.com"));
        assert!(!allowlist.allows("example.com"));
        assert!(!allowlist.allows("notchatgpt.com"));
    }
}
