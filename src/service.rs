//! 服务编排模块
//!
//! # 设计思路
//!
//! `CaptureService` 承载一次完整的用户动作：捕获 → 入队 → （白名单命中时）
//! 自动粘贴。它把各组件的错误翻译成用户可读的提示文案，通过 `Notifier`
//! 抽象交给宿主展示——顶层流程永远不会把原始异常抛回宿主页面。
//!
//! # 实现思路
//!
//! - 捕获失败是终态：提示用户并返回错误。
//! - 入队失败同样是终态：剪贴板里已经有图，但队列状态不能静默丢失。
//! - 自动粘贴失败是**非终态**：图已在剪贴板，提示用户手动 Ctrl+V 即可，
//!   整个动作仍视为成功。
//! - 并发触发不加单飞锁：两次动作可能交错入队，剪贴板后写者胜。

use std::sync::Arc;

use crate::capture::{
    CaptureError, CaptureHandler, CaptureOutcome, ClipboardFailureKind,
};
use crate::dom::{Document, Element};
use crate::error::AppError;
use crate::paste::{HostAllowlist, PageAdapter, PasteOrchestrator};
use crate::queue::{QueueStore, QueuedImage};
use crate::store::KvStore;

/// 用户提示出口。宿主决定展示形态（toast、控制台等）。
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// 默认提示出口：写结构化日志。
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        log::info!("🔔 {}", message);
    }
}

/// 一次用户动作的结果。
#[derive(Debug, Clone)]
pub struct CaptureReport {
    /// 入队后的图片记录。
    pub record: QueuedImage,
    /// 自动粘贴是否执行且被接受。
    pub pasted: bool,
}

/// 完整用户动作的编排器。
pub struct CaptureService {
    handler: CaptureHandler,
    queue: QueueStore,
    orchestrator: PasteOrchestrator,
    allowlist: HostAllowlist,
    notifier: Box<dyn Notifier>,
}

impl CaptureService {
    pub fn new(
        handler: CaptureHandler,
        store: Arc<dyn KvStore>,
        queue_bound: usize,
        orchestrator: PasteOrchestrator,
        allowlist: HostAllowlist,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            handler,
            queue: QueueStore::new(store, queue_bound),
            orchestrator,
            allowlist,
            notifier,
        }
    }

    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    pub fn handler(&self) -> &CaptureHandler {
        &self.handler
    }

    /// 宿主接入完成后广播就绪信号。
    pub async fn announce_ready(&self) {
        self.handler.announce_ready().await;
    }

    /// 捕获快捷键入口：捕获高亮元素，入队，并在白名单主机上尝试自动粘贴。
    ///
    /// `selected_prompt_id` 为面板当前选中的提示词；命中时作为模板文本
    /// 随粘贴一起插入，并记录到图片记录上。
    pub async fn capture_and_transfer(
        &self,
        document: &Document,
        element: &Element,
        page: &mut dyn PageAdapter,
        selected_prompt_id: Option<&str>,
    ) -> Result<CaptureReport, AppError> {
        let outcome = match self.handler.capture_element(document, element).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.notifier.notify(&capture_failure_message(&error));
                return Err(error.into());
            }
        };

        let record = self.enqueue(&outcome, selected_prompt_id)?;

        if !self.allowlist.allows(document.host()) {
            log::debug!("🏠 主机 {} 不在自动粘贴白名单，跳过粘贴", document.host());
            self.notifier.notify("Image copied to clipboard.");
            return Ok(CaptureReport {
                record,
                pasted: false,
            });
        }

        let template = self.resolve_template(selected_prompt_id)?;
        let pasted = match self.orchestrator.paste(page, template.as_deref()).await {
            Ok(true) => {
                self.notifier.notify("Image pasted. Verify it landed in the input.");
                true
            }
            Ok(false) => {
                self.notifier
                    .notify("Auto-paste failed. Press Ctrl+V / Cmd+V.");
                false
            }
            Err(error) => {
                // 图已在剪贴板，粘贴失败不推翻整个动作。
                log::warn!("⚠️ 自动粘贴失败：{}", error);
                self.notifier
                    .notify("Auto-paste failed. Press Ctrl+V / Cmd+V.");
                false
            }
        };

        Ok(CaptureReport { record, pasted })
    }

    /// 面板上的“复制提示词”动作：把提示词文本单独写入剪贴板。
    pub async fn copy_prompt(&self, prompt_id: &str) -> Result<(), AppError> {
        let Some(prompt) = self.queue.find_prompt(prompt_id)? else {
            return Err(AppError::Storage(format!("提示词不存在: {}", prompt_id)));
        };

        let config = self.handler.config_snapshot()?;
        self.handler
            .copy_text_to_clipboard(&prompt.text, &config)
            .await?;
        self.notifier.notify("Prompt copied to clipboard.");
        Ok(())
    }

    fn enqueue(
        &self,
        outcome: &CaptureOutcome,
        selected_prompt_id: Option<&str>,
    ) -> Result<QueuedImage, AppError> {
        self.queue.push_image(
            outcome.image.to_data_url(),
            outcome.thumbnail.to_data_url(),
            outcome.source.clone(),
            selected_prompt_id.map(str::to_string),
        )
    }

    fn resolve_template(&self, prompt_id: Option<&str>) -> Result<Option<String>, AppError> {
        let Some(id) = prompt_id else {
            return Ok(None);
        };
        Ok(self.queue.find_prompt(id)?.map(|p| p.text))
    }
}

/// 捕获错误到用户提示文案的映射。
fn capture_failure_message(error: &CaptureError) -> String {
    match error {
        CaptureError::Locate(_) => "No image found under the cursor.".to_string(),
        // 捕获路径不会产生 NoTarget；它属于粘贴路径的输入框缺失。
        CaptureError::NoTarget(_) => "Input field not found on the page.".to_string(),
        CaptureError::Fetch(_) | CaptureError::Channel(_) => {
            "Could not download the image.".to_string()
        }
        CaptureError::Decode(_) | CaptureError::ResourceLimit(_) => {
            "This image could not be processed.".to_string()
        }
        CaptureError::Clipboard(failure) => match failure.kind {
            ClipboardFailureKind::FocusDenied => {
                "Clipboard permission needed — click the page first.".to_string()
            }
            _ => "Could not copy the image to the clipboard.".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ClipboardFailure;

    #[test]
    fn focus_denied_maps_to_click_the_page_hint() {
        let error = CaptureError::Clipboard(ClipboardFailure::focus_denied("no focus"));

        assert_eq!(
            capture_failure_message(&error),
            "Clipboard permission needed — click the page first."
        );
    }

    #[test]
    fn missing_image_maps_to_plain_language() {
        let error = CaptureError::Locate("<p>".to_string());

        assert_eq!(capture_failure_message(&error), "No image found under the cursor.");
    }

    #[test]
    fn locate_and_paste_target_failures_map_to_distinct_hints() {
        let no_image = CaptureError::Locate("<p>".to_string());
        let no_input = CaptureError::NoTarget("input missing".to_string());

        assert_ne!(
            capture_failure_message(&no_image),
            capture_failure_message(&no_input)
        );
    }
}
