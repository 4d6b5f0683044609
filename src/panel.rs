//! 浮动面板状态模块
//!
//! # 设计思路
//!
//! 面板的选中状态（当前选中的图片/提示词）是显式状态对象，由面板实例持有，
//! 不落盘、不跨进程共享；删除选中项时选中态立即复位，保证不会指向幽灵记录。
//! 面板位置则相反：跨页面加载持久化，面板创建时读取，拖拽结束时写回。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::store::KvStore;

const PANEL_POSITION_KEY: &str = "panelPosition";

/// 面板左上角的像素偏移。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelPosition {
    pub top: i32,
    pub left: i32,
}

/// 面板运行时状态：选中态 + 位置持久化入口。
pub struct PanelState {
    store: Arc<dyn KvStore>,
    selected_image: Option<String>,
    selected_prompt: Option<String>,
}

impl PanelState {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            selected_image: None,
            selected_prompt: None,
        }
    }

    // ── 选中态 ───────────────────────────────────────────────

    pub fn select_image(&mut self, id: Option<String>) {
        self.selected_image = id;
    }

    pub fn selected_image(&self) -> Option<&str> {
        self.selected_image.as_deref()
    }

    pub fn select_prompt(&mut self, id: Option<String>) {
        self.selected_prompt = id;
    }

    pub fn selected_prompt(&self) -> Option<&str> {
        self.selected_prompt.as_deref()
    }

    /// 图片记录删除后的选中态维护：删的是当前选中项则复位。
    pub fn on_image_deleted(&mut self, id: &str) {
        if self.selected_image.as_deref() == Some(id) {
            self.selected_image = None;
        }
    }

    pub fn on_prompt_deleted(&mut self, id: &str) {
        if self.selected_prompt.as_deref() == Some(id) {
            self.selected_prompt = None;
        }
    }

    // ── 位置持久化 ───────────────────────────────────────────

    /// 读取上次保存的面板位置。从未保存或数据损坏时返回 `None`。
    pub fn load_position(&self) -> Result<Option<PanelPosition>, AppError> {
        match self.store.get(PANEL_POSITION_KEY)? {
            None => Ok(None),
            Some(value) => match serde_json::from_value(value) {
                Ok(position) => Ok(Some(position)),
                Err(e) => {
                    // 位置不值得为之报错，丢弃坏数据按首次使用处理。
                    log::warn!("⚠️ 面板位置数据损坏，忽略：{}", e);
                    Ok(None)
                }
            },
        }
    }

    /// 保存面板位置（调用方在拖拽结束时触发）。
    pub fn save_position(&self, position: PanelPosition) -> Result<(), AppError> {
        let value = serde_json::to_value(position)
            .map_err(|e| AppError::Storage(format!("序列化面板位置失败: {}", e)))?;
        self.store.set(PANEL_POSITION_KEY, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn panel() -> PanelState {
        PanelState::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn deleting_selected_image_resets_selection() {
        let mut state = panel();
        state.select_image(Some("img-1".to_string()));

        state.on_image_deleted("img-1");

        assert_eq!(state.selected_image(), None);
    }

    #[test]
    fn deleting_other_image_keeps_selection() {
        let mut state = panel();
        state.select_image(Some("img-1".to_string()));

        state.on_image_deleted("img-2");

        assert_eq!(state.selected_image(), Some("img-1"));
    }

    #[test]
    fn position_round_trips_through_store() {
        let state = panel();

        state
            .save_position(PanelPosition { top: 40, left: 120 })
            .expect("save failed");

        assert_eq!(
            state.load_position().expect("load failed"),
            Some(PanelPosition { top: 40, left: 120 })
        );
    }

    #[test]
    fn corrupt_position_reads_as_none() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(PANEL_POSITION_KEY, serde_json::json!("not-a-position"))
            .expect("seed failed");
        let state = PanelState::new(store);

        assert_eq!(state.load_position().expect("load failed"), None);
    }
}
