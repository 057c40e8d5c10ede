// ==========================================
// 单车道客运站 - 票据与二维码载荷
// ==========================================
// 线格式(逐字节): vehicle:<PLATE>|ticket:<8位补零十进制>|fd:<FD>
// 红线: 恰好两个 '|' 分隔符，每段均为 key:value
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 票号位数
pub const TICKET_ID_WIDTH: usize = 8;

/// 将计数器值格式化为 8 位补零票号
pub fn format_ticket_id(value: i64) -> String {
    format!("{:0width$}", value, width = TICKET_ID_WIDTH)
}

// ==========================================
// Ticket - 出场票据
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub qr_payload: String,
}

// ==========================================
// QrPayload - 二维码载荷
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload {
    pub plate_number: String,
    pub ticket_id: String,
    pub fd: String,
}

/// 二维码解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QrParseError {
    #[error("二维码段数错误: 期望 3 段, 实际 {0} 段")]
    SegmentCount(usize),

    #[error("二维码段格式错误: {0}")]
    MalformedSegment(String),

    #[error("二维码字段错误: 期望 {expected}, 实际 {actual}")]
    UnexpectedKey { expected: &'static str, actual: String },

    #[error("票号格式错误: {0}")]
    InvalidTicketId(String),
}

impl QrPayload {
    pub fn new(plate_number: &str, ticket_id: &str, fd: &str) -> Self {
        Self {
            plate_number: plate_number.to_string(),
            ticket_id: ticket_id.to_string(),
            fd: fd.to_string(),
        }
    }

    /// 解析二维码载荷
    ///
    /// # 错误
    /// - 段数不是 3
    /// - 某段不是 key:value 或 value 为空
    /// - 键顺序不是 vehicle / ticket / fd
    /// - 票号不是 8 位数字
    pub fn parse(raw: &str) -> Result<Self, QrParseError> {
        let segments: Vec<&str> = raw.trim().split('|').collect();
        if segments.len() != 3 {
            return Err(QrParseError::SegmentCount(segments.len()));
        }

        let plate = Self::segment_value(segments[0], "vehicle")?;
        let ticket = Self::segment_value(segments[1], "ticket")?;
        let fd = Self::segment_value(segments[2], "fd")?;

        if ticket.len() != TICKET_ID_WIDTH || !ticket.bytes().all(|b| b.is_ascii_digit()) {
            return Err(QrParseError::InvalidTicketId(ticket.to_string()));
        }

        Ok(Self::new(plate, ticket, fd))
    }

    fn segment_value<'a>(segment: &'a str, expected: &'static str) -> Result<&'a str, QrParseError> {
        let (key, value) = segment
            .split_once(':')
            .ok_or_else(|| QrParseError::MalformedSegment(segment.to_string()))?;

        if key != expected {
            return Err(QrParseError::UnexpectedKey {
                expected,
                actual: key.to_string(),
            });
        }
        if value.is_empty() || value.contains(':') {
            return Err(QrParseError::MalformedSegment(segment.to_string()));
        }
        Ok(value)
    }
}

impl fmt::Display for QrPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vehicle:{}|ticket:{}|fd:{}",
            self.plate_number, self.ticket_id, self.fd
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ticket_id() {
        assert_eq!(format_ticket_id(7), "00000007");
        assert_eq!(format_ticket_id(12345678), "12345678");
    }

    #[test]
    fn test_parse_valid_payload() {
        let qr = QrPayload::parse("vehicle:ABC-123|ticket:00000007|fd:FD1").unwrap();
        assert_eq!(qr.plate_number, "ABC-123");
        assert_eq!(qr.ticket_id, "00000007");
        assert_eq!(qr.fd, "FD1");
        assert_eq!(qr.to_string(), "vehicle:ABC-123|ticket:00000007|fd:FD1");
    }

    #[test]
    fn test_parse_rejects_wrong_segment_count() {
        assert_eq!(
            QrPayload::parse("vehicle:ABC-123|ticket:00000007"),
            Err(QrParseError::SegmentCount(2))
        );
        assert_eq!(
            QrPayload::parse("vehicle:ABC-123|ticket:00000007|fd:FD1|time:1700000000000"),
            Err(QrParseError::SegmentCount(4))
        );
    }

    #[test]
    fn test_parse_rejects_bad_segments() {
        assert!(matches!(
            QrPayload::parse("vehicle ABC-123|ticket:00000007|fd:FD1"),
            Err(QrParseError::MalformedSegment(_))
        ));
        assert!(matches!(
            QrPayload::parse("plate:ABC-123|ticket:00000007|fd:FD1"),
            Err(QrParseError::UnexpectedKey { expected: "vehicle", .. })
        ));
        assert!(matches!(
            QrPayload::parse("vehicle:ABC-123|ticket:7|fd:FD1"),
            Err(QrParseError::InvalidTicketId(_))
        ));
        assert!(matches!(
            QrPayload::parse("vehicle:|ticket:00000007|fd:FD1"),
            Err(QrParseError::MalformedSegment(_))
        ));
    }
}
