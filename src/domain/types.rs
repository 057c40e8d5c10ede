// ==========================================
// 单车道客运站 - 领域类型定义
// ==========================================
// 职责: 车道动作/状态、通行证类型、车辆状态、处罚状态、touchdown 子状态
// 约定: 数据库存储使用 as_str() 的字面值，解析使用 parse()
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 排号车辆所属的线路代码（FD1 + Pila 才分配排队号）
pub const QUEUE_FD_CODE: &str = "FD1";

// ==========================================
// 车道动作 (Lane Action)
// ==========================================
// 两个互斥的检查点: 进场 / 出场
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneAction {
    Entry, // 进场
    Exit,  // 出场
}

impl LaneAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneAction::Entry => "entry",
            LaneAction::Exit => "exit",
        }
    }

    /// 下一个动作: 上次进场 → 本次出场，其余 → 进场
    pub fn next_after(previous: Option<LaneAction>) -> LaneAction {
        match previous {
            Some(LaneAction::Entry) => LaneAction::Exit,
            _ => LaneAction::Entry,
        }
    }
}

impl fmt::Display for LaneAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LaneAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" => Ok(LaneAction::Entry),
            "exit" => Ok(LaneAction::Exit),
            other => Err(format!("未知车道动作: {}", other)),
        }
    }
}

// ==========================================
// 车道占用状态 (Lane State)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneState {
    Active, // 占用检查点
    Queued, // 排队等待
}

impl LaneState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneState::Active => "active",
            LaneState::Queued => "queued",
        }
    }
}

impl fmt::Display for LaneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LaneState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(LaneState::Active),
            "queued" => Ok(LaneState::Queued),
            other => Err(format!("未知车道状态: {}", other)),
        }
    }
}

// ==========================================
// 通行证类型 (Pass)
// ==========================================
// Pila: 排号客运; Taxi: 普通; SP: 特别通行证
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassType {
    Pila,
    Taxi,
    SP,
}

impl PassType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassType::Pila => "Pila",
            PassType::Taxi => "Taxi",
            PassType::SP => "SP",
        }
    }

    /// 未设置通行证时的默认值: FD1 → Pila，其余 → Taxi
    pub fn default_for_fd(fd: Option<&str>) -> PassType {
        match fd {
            Some(code) if code.eq_ignore_ascii_case(QUEUE_FD_CODE) => PassType::Pila,
            _ => PassType::Taxi,
        }
    }
}

impl fmt::Display for PassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PassType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PILA" => Ok(PassType::Pila),
            "TAXI" => Ok(PassType::Taxi),
            "SP" => Ok(PassType::SP),
            other => Err(format!("未知通行证类型: {}", other)),
        }
    }
}

/// 是否为排号车辆（FD1 且 Pila）
pub fn is_queue_numbered(fd: Option<&str>, pass: Option<PassType>) -> bool {
    matches!(fd, Some(code) if code.eq_ignore_ascii_case(QUEUE_FD_CODE))
        && pass == Some(PassType::Pila)
}

// ==========================================
// 车辆登记状态 (Vehicle Status)
// ==========================================
// 仅表示登记证件有效性，与处罚状态相互独立
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicleStatus {
    Ok,
    Expired,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Ok => "Ok",
            VehicleStatus::Expired => "Expired",
        }
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Ok" | "OK" => Ok(VehicleStatus::Ok),
            "Expired" | "EXPIRED" => Ok(VehicleStatus::Expired),
            other => Err(format!("未知车辆状态: {}", other)),
        }
    }
}

// ==========================================
// 处罚状态 (Penalty Status)
// ==========================================
// None → Penalty → Lifted → (24h 后清扫) → None
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenaltyStatus {
    None,
    Penalty,
    Lifted,
}

impl PenaltyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PenaltyStatus::None => "None",
            PenaltyStatus::Penalty => "Penalty",
            PenaltyStatus::Lifted => "Lifted",
        }
    }
}

impl fmt::Display for PenaltyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PenaltyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "None" | "NONE" | "" => Ok(PenaltyStatus::None),
            "Penalty" | "PENALTY" => Ok(PenaltyStatus::Penalty),
            "Lifted" | "LIFTED" => Ok(PenaltyStatus::Lifted),
            other => Err(format!("未知处罚状态: {}", other)),
        }
    }
}

// ==========================================
// Touchdown - 单次通行记录的细粒度子状态
// ==========================================
// processing → {waiting, dispatch, ongoing}
//            → {Exited Successfully, Exited/...}
//            → Penalty Lifted
// 存储值与终端界面显示字面值保持一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Touchdown {
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "ongoing")]
    Ongoing,
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "dispatch")]
    Dispatch,
    #[serde(rename = "Exited Successfully")]
    ExitedSuccessfully,
    #[serde(rename = "Exited/Wrong Endpoint")]
    ExitedWrongEndpoint,
    #[serde(rename = "Exited/Expired ticket")]
    ExitedExpiredTicket,
    #[serde(rename = "Exited/No ticket or no exit")]
    ExitedNoExitRecord,
    #[serde(rename = "Penalty Lifted")]
    PenaltyLifted,
    #[serde(rename = "canceled")]
    Canceled,
}

impl Touchdown {
    pub fn as_str(&self) -> &'static str {
        match self {
            Touchdown::Processing => "processing",
            Touchdown::Ongoing => "ongoing",
            Touchdown::Waiting => "waiting",
            Touchdown::Dispatch => "dispatch",
            Touchdown::ExitedSuccessfully => "Exited Successfully",
            Touchdown::ExitedWrongEndpoint => "Exited/Wrong Endpoint",
            Touchdown::ExitedExpiredTicket => "Exited/Expired ticket",
            Touchdown::ExitedNoExitRecord => "Exited/No ticket or no exit",
            Touchdown::PenaltyLifted => "Penalty Lifted",
            Touchdown::Canceled => "canceled",
        }
    }

    /// 出场后的初始 touchdown: 排号车辆 dispatch，其余 ongoing
    pub fn after_exit(queue_numbered: bool) -> Touchdown {
        if queue_numbered {
            Touchdown::Dispatch
        } else {
            Touchdown::Ongoing
        }
    }

    /// 在途状态（解除处罚时不得覆盖）
    pub fn is_in_transit(&self) -> bool {
        matches!(self, Touchdown::Ongoing | Touchdown::Waiting | Touchdown::Dispatch)
    }

    /// 解除处罚时是否需要改写为 "Penalty Lifted"
    ///
    /// 规则: 字面值包含 "Penalty" 或以 "Exited/" 开头
    pub fn is_liftable(&self) -> bool {
        let s = self.as_str();
        s.contains("Penalty") || s.starts_with("Exited/")
    }

    /// 是否为处罚类结局
    pub fn is_penalty_outcome(&self) -> bool {
        matches!(
            self,
            Touchdown::ExitedWrongEndpoint
                | Touchdown::ExitedExpiredTicket
                | Touchdown::ExitedNoExitRecord
        )
    }
}

impl fmt::Display for Touchdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Touchdown {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "processing" => Ok(Touchdown::Processing),
            "ongoing" => Ok(Touchdown::Ongoing),
            "waiting" => Ok(Touchdown::Waiting),
            "dispatch" => Ok(Touchdown::Dispatch),
            "Exited Successfully" => Ok(Touchdown::ExitedSuccessfully),
            "Exited/Wrong Endpoint" => Ok(Touchdown::ExitedWrongEndpoint),
            "Exited/Expired ticket" => Ok(Touchdown::ExitedExpiredTicket),
            // 历史数据中存在拆分的两种写法
            "Exited/No ticket or no exit" | "Exited/No Ticket" | "Exited/No Exit" => {
                Ok(Touchdown::ExitedNoExitRecord)
            }
            "Penalty Lifted" => Ok(Touchdown::PenaltyLifted),
            "canceled" => Ok(Touchdown::Canceled),
            other => Err(format!("未知 touchdown: {}", other)),
        }
    }
}
