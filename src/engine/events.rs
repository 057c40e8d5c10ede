// ==========================================
// 单车道客运站 - 引擎层事件发布
// ==========================================
// 职责: 定义车道事件发布 trait，实现依赖倒置
// 说明: Engine 层定义 trait，App 层提供广播适配器
// 红线: 发布发生在事务提交之后；发布失败只记录 warn，不回滚业务
// ==========================================

use crate::domain::entry_log::SystemSnapshot;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;
use tokio::sync::broadcast;

// ==========================================
// 车道事件类型
// ==========================================

/// 车道事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum LaneEvent {
    /// 车道占用/排队变更（携带最新快照）
    SystemStateChanged(SystemSnapshot),
    /// 通行记录变更（前端据此刷新列表）
    EntryLogsChanged,
    /// 处罚解除
    PenaltyLifted { plate_number: String, vehicle_id: String },
}

impl LaneEvent {
    /// 事件名（SSE event 字段）
    pub fn name(&self) -> &'static str {
        match self {
            LaneEvent::SystemStateChanged(_) => "systemStateUpdate",
            LaneEvent::EntryLogsChanged => "entryLogsUpdate",
            LaneEvent::PenaltyLifted { .. } => "penaltyLifted",
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 车道事件发布者
///
/// 通知传输属于外部协作方（WebSocket / SSE / 消息队列），
/// 引擎只依赖此 trait
pub trait LaneEventPublisher: Send + Sync {
    fn publish(&self, event: LaneEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl LaneEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: LaneEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!("NoOpEventPublisher: 跳过事件发布 - event={}", event.name());
        Ok(())
    }
}

/// 基于 tokio broadcast 的发布者
///
/// 无订阅者时事件直接丢弃（不视为失败）
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<LaneEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LaneEvent> {
        self.sender.subscribe()
    }
}

impl LaneEventPublisher for BroadcastEventPublisher {
    fn publish(&self, event: LaneEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(event = name, receivers, "车道事件已广播");
            }
            Err(_) => {
                tracing::debug!(event = name, "无订阅者，事件丢弃");
            }
        }
        Ok(())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn LaneEventPublisher>> 的使用；
/// 发布失败在此处降级为 warn
#[derive(Clone, Default)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn LaneEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn LaneEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例（不发布事件）
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件（如果有发布者）
    pub fn publish(&self, event: LaneEvent) {
        let Some(publisher) = &self.inner else {
            tracing::debug!("OptionalEventPublisher: 未配置发布者，跳过事件 - event={}", event.name());
            return;
        };
        let name = event.name();
        if let Err(e) = publisher.publish(event) {
            tracing::warn!(event = name, error = %e, "车道事件发布失败");
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}
