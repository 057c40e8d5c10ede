// ==========================================
// 单车道客运站 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// 说明: 所有组件共享同一个 SQLite 连接（Mutex 串行化）
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{DashboardApi, LaneApi, PenaltyApi, ReservationApi, ScanApi, SweepApi};
use crate::config::config_manager::ConfigManager;
use crate::engine::{
    BroadcastEventPublisher, LaneEngine, OptionalEventPublisher, PenaltyEngine,
    ReservationEngine, StatusSweeper, TicketEngine,
};
use crate::repository::entry_log_repo::EntryLogRepository;

/// 推送通道容量（慢订阅者落后超过此数量时丢弃旧事件）
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 应用状态
///
/// 包含所有API实例和共享资源，作为 axum 路由状态
#[derive(Clone)]
pub struct AppState {
    /// 数据库路径（内存库为 ":memory:"）
    pub db_path: String,

    /// 车道操作API
    pub lane_api: Arc<LaneApi>,

    /// 扫码验证API
    pub scan_api: Arc<ScanApi>,

    /// 处罚管理API
    pub penalty_api: Arc<PenaltyApi>,

    /// 看板查询API
    pub dashboard_api: Arc<DashboardApi>,

    /// 状态清扫API
    pub sweep_api: Arc<SweepApi>,

    /// 预约与排班API
    pub reservation_api: Arc<ReservationApi>,

    /// 状态清扫作业（后台调度共享同一实例）
    pub sweeper: Arc<StatusSweeper>,

    /// 事件广播器（SSE 订阅）
    pub events: Arc<BroadcastEventPublisher>,
}

impl AppState {
    /// 打开数据库并创建AppState
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开连接并应用统一 PRAGMA
    /// 2. 幂等建表
    /// 3. 创建所有Engine与API实例
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = crate::db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::db::init_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;

        match crate::db::read_schema_version(&conn) {
            Ok(Some(v)) if v == crate::db::CURRENT_SCHEMA_VERSION => {}
            Ok(v) => tracing::warn!(
                found = ?v,
                expected = crate::db::CURRENT_SCHEMA_VERSION,
                "schema_version 与当前代码不一致"
            ),
            Err(e) => tracing::warn!("读取 schema_version 失败(将继续启动): {}", e),
        }

        let mut state = Self::from_connection(conn);
        state.db_path = db_path;
        Ok(state)
    }

    /// 基于已初始化 schema 的连接创建AppState（测试用内存库亦走此路径）
    pub fn from_connection(conn: Connection) -> Self {
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置与事件
        // ==========================================
        let config = Arc::new(ConfigManager::from_connection(conn.clone()));
        let events = Arc::new(BroadcastEventPublisher::new(EVENT_CHANNEL_CAPACITY));
        let publisher = OptionalEventPublisher::with_publisher(events.clone());

        // ==========================================
        // 引擎层
        // ==========================================
        let lane = Arc::new(LaneEngine::new(conn.clone(), config.clone(), publisher.clone()));
        let tickets = Arc::new(TicketEngine::new(conn.clone(), config.clone(), publisher.clone()));
        let penalties = Arc::new(PenaltyEngine::new(conn.clone(), publisher));
        let sweeper = Arc::new(StatusSweeper::new(conn.clone(), config.clone()));
        let reservations = Arc::new(ReservationEngine::new(conn.clone(), config.clone()));

        // ==========================================
        // API层
        // ==========================================
        let entry_log_repo = Arc::new(EntryLogRepository::new(conn));

        Self {
            db_path: ":memory:".to_string(),
            lane_api: Arc::new(LaneApi::new(lane)),
            scan_api: Arc::new(ScanApi::new(tickets)),
            penalty_api: Arc::new(PenaltyApi::new(penalties)),
            dashboard_api: Arc::new(DashboardApi::new(entry_log_repo, config)),
            sweep_api: Arc::new(SweepApi::new(sweeper.clone())),
            reservation_api: Arc::new(ReservationApi::new(reservations)),
            sweeper,
            events,
        }
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 TERMINAL_LANE_DB_PATH → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/部署）
    if let Ok(path) = std::env::var("TERMINAL_LANE_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./terminal_lane.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("terminal-lane");
        match std::fs::create_dir_all(&dir) {
            Ok(()) => path = dir.join("terminal_lane.db"),
            Err(e) => tracing::warn!("创建数据目录失败，使用当前目录: {}", e),
        }
    }

    path.to_string_lossy().to_string()
}
