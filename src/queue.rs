//! 捕获队列模块
//!
//! # 设计思路
//!
//! 捕获到的图片与用户积累的提示词各自维护一条有界队列，新记录在前，
//! 超出容量时从尾部淘汰最旧记录。队列整体以 JSON 形式存进 `KvStore`，
//! 每次变更全量覆盖写回——队列容量很小，全量写比增量补丁简单且不会写坏。
//!
//! # 实现思路
//!
//! - 记录字段名固定为 camelCase，与既有存储区数据保持互读。
//! - 提示词按去除首尾空白后的内容去重：重复提交刷新时间并提到队首。
//! - 删除幂等：目标不存在时静默成功。
//! - 记录 id 由毫秒时间戳与进程内计数器拼成，同毫秒内也不冲突。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::store::KvStore;

const IMAGE_QUEUE_KEY: &str = "imageQueue";
const PROMPT_QUEUE_KEY: &str = "promptQueue";

static RECORD_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_record_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = RECORD_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", millis, seq)
}

/// 队列中的一条图片记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedImage {
    pub id: String,
    /// 规范化主图的 Data URL。
    pub data_url: String,
    /// JPEG 缩略图的 Data URL，供列表渲染。
    pub thumbnail_url: String,
    /// 来源描述（远程地址或内联占位）。
    pub source_url: String,
    /// 入队时间（Unix 毫秒）。
    pub timestamp: i64,
    /// 捕获时关联的提示词 id（若有）。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
}

/// 队列中的一条提示词记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedPrompt {
    pub id: String,
    pub text: String,
    pub timestamp: i64,
    /// 记录来源（手动录入 / 捕获时随图保存）。
    pub source: String,
}

/// 有界队列存取器。
pub struct QueueStore {
    store: Arc<dyn KvStore>,
    bound: usize,
}

impl QueueStore {
    pub fn new(store: Arc<dyn KvStore>, bound: usize) -> Self {
        Self {
            store,
            bound: bound.max(1),
        }
    }

    // ── 图片队列 ─────────────────────────────────────────────

    /// 入队一条图片记录，超界时淘汰最旧记录。返回写入后的记录。
    pub fn push_image(
        &self,
        data_url: impl Into<String>,
        thumbnail_url: impl Into<String>,
        source_url: impl Into<String>,
        prompt_id: Option<String>,
    ) -> Result<QueuedImage, AppError> {
        let record = QueuedImage {
            id: next_record_id(),
            data_url: data_url.into(),
            thumbnail_url: thumbnail_url.into(),
            source_url: source_url.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            prompt_id,
        };

        let mut images = self.list_images()?;
        images.insert(0, record.clone());
        if images.len() > self.bound {
            let evicted = images.len() - self.bound;
            images.truncate(self.bound);
            log::debug!("📪 图片队列超界，淘汰 {} 条最旧记录", evicted);
        }

        self.save(IMAGE_QUEUE_KEY, &images)?;
        Ok(record)
    }

    /// 读取图片队列，新记录在前。
    pub fn list_images(&self) -> Result<Vec<QueuedImage>, AppError> {
        let mut images: Vec<QueuedImage> = self.load(IMAGE_QUEUE_KEY)?;
        images.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(images)
    }

    /// 删除指定图片记录。目标不存在时静默成功。
    pub fn delete_image(&self, id: &str) -> Result<(), AppError> {
        let mut images = self.list_images()?;
        let before = images.len();
        images.retain(|record| record.id != id);
        if images.len() != before {
            self.save(IMAGE_QUEUE_KEY, &images)?;
        }
        Ok(())
    }

    // ── 提示词队列 ───────────────────────────────────────────

    /// 录入提示词。内容按去空白后去重：已存在时刷新时间并提到队首。
    ///
    /// 去空白后为空的内容直接拒绝。
    pub fn upsert_prompt(
        &self,
        text: &str,
        source: impl Into<String>,
    ) -> Result<QueuedPrompt, AppError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AppError::Storage("提示词内容为空".to_string()));
        }

        let mut prompts = self.list_prompts()?;
        let now = chrono::Utc::now().timestamp_millis();

        let record = if let Some(pos) = prompts.iter().position(|p| p.text == trimmed) {
            let mut existing = prompts.remove(pos);
            existing.timestamp = now;
            log::debug!("📝 提示词已存在，刷新时间并提前：{}", existing.id);
            existing
        } else {
            QueuedPrompt {
                id: next_record_id(),
                text: trimmed.to_string(),
                timestamp: now,
                source: source.into(),
            }
        };

        prompts.insert(0, record.clone());
        if prompts.len() > self.bound {
            prompts.truncate(self.bound);
        }

        self.save(PROMPT_QUEUE_KEY, &prompts)?;
        Ok(record)
    }

    /// 读取提示词队列，新记录在前。
    pub fn list_prompts(&self) -> Result<Vec<QueuedPrompt>, AppError> {
        let mut prompts: Vec<QueuedPrompt> = self.load(PROMPT_QUEUE_KEY)?;
        prompts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(prompts)
    }

    /// 按 id 查找提示词。
    pub fn find_prompt(&self, id: &str) -> Result<Option<QueuedPrompt>, AppError> {
        Ok(self.list_prompts()?.into_iter().find(|p| p.id == id))
    }

    /// 删除指定提示词。目标不存在时静默成功。
    pub fn delete_prompt(&self, id: &str) -> Result<(), AppError> {
        let mut prompts = self.list_prompts()?;
        let before = prompts.len();
        prompts.retain(|record| record.id != id);
        if prompts.len() != before {
            self.save(PROMPT_QUEUE_KEY, &prompts)?;
        }
        Ok(())
    }

    // ── 序列化 ───────────────────────────────────────────────

    fn load<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, AppError> {
        match self.store.get(key)? {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| AppError::Storage(format!("队列 '{}' 数据损坏: {}", key, e))),
        }
    }

    fn save<T: Serialize>(&self, key: &str, records: &[T]) -> Result<(), AppError> {
        let value = serde_json::to_value(records)
            .map_err(|e| AppError::Storage(format!("队列 '{}' 序列化失败: {}", key, e)))?;
        self.store.set(key, value)
    }
}
