// ==========================================
// 外勤运营平台 - 规范化器
// ==========================================
// 职责: 文本折叠 / 状态与优先级映射 / 证件号 / 邮编 / 门牌号 / 日期解析
// 说明: 失败返回面向操作员的消息，由字段校验器包装为 ValidationError
// ==========================================

use crate::config::ImportConfig;
use crate::domain::{AppointmentStatus, Priority};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;
use std::sync::LazyLock;

static POSTAL_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{5}-?\d{3}$").expect("valid postal code regex"));

static ISO_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("valid iso date regex"));

static BR_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}").expect("valid br date regex"));

const ISO_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

const BR_FORMATS: &[&str] = &["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];

const FALLBACK_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M",
];

const FALLBACK_DATE_FORMATS: &[&str] = &["%Y/%m/%d", "%d-%m-%Y", "%d.%m.%Y"];

/// 文本折叠: 小写 + 去变音符 + `_`/`-` 视为空格 + 合并空白
pub fn fold_text(raw: &str) -> String {
    let mapped: String = raw
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            '_' | '-' => ' ',
            other => other,
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ==========================================
// DateParseError - 日期解析失败原因
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateParseError {
    Unrecognized,
    OutOfRange { year: i32 },
}

// ==========================================
// Normalizer
// ==========================================
#[derive(Debug, Clone)]
pub struct Normalizer {
    min_year: i32,
    max_year: i32,
    offset: FixedOffset,
}

impl Normalizer {
    pub fn new(config: &ImportConfig) -> Self {
        Self {
            min_year: config.min_year,
            max_year: config.max_year,
            offset: config.utc_offset(),
        }
    }

    pub fn year_window(&self) -> (i32, i32) {
        (self.min_year, self.max_year)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// 状态自由文本 → 规范值
    pub fn status(&self, raw: &str) -> Result<AppointmentStatus, String> {
        let folded = fold_text(raw);
        let status = match folded.as_str() {
            "agendado" | "agendada" | "scheduled" => AppointmentStatus::Scheduled,
            "em andamento" | "andamento" | "in progress" | "em execucao" => {
                AppointmentStatus::InProgress
            }
            "concluido" | "concluida" | "completed" | "finalizado" => AppointmentStatus::Completed,
            "cancelado" | "cancelada" | "cancelled" | "canceled" => AppointmentStatus::Cancelled,
            _ => {
                let accepted: Vec<&str> = AppointmentStatus::ALL.iter().map(|s| s.as_str()).collect();
                return Err(format!(
                    "Status \"{}\" is not recognized (accepted: {})",
                    raw,
                    accepted.join(", ")
                ));
            }
        };
        Ok(status)
    }

    /// 优先级自由文本 → 规范值
    pub fn priority(&self, raw: &str) -> Result<Priority, String> {
        match fold_text(raw).as_str() {
            "normal" => Ok(Priority::Normal),
            "alta" | "high" => Ok(Priority::High),
            "urgente" | "urgent" => Ok(Priority::Urgent),
            _ => {
                let accepted: Vec<&str> = Priority::ALL.iter().map(|p| p.as_str()).collect();
                Err(format!(
                    "Priority \"{}\" is not recognized (accepted: {})",
                    raw,
                    accepted.join(", ")
                ))
            }
        }
    }

    /// 证件号 → 仅数字（个人 11 位 / 企业 14 位）
    pub fn tax_id(&self, raw: &str) -> Result<String, String> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        match digits.len() {
            11 | 14 => Ok(digits),
            _ => Err(format!(
                "Tax ID \"{}\" is invalid (expected 11 or 14 digits)",
                raw
            )),
        }
    }

    pub fn postal_code(&self, raw: &str) -> Result<String, String> {
        if POSTAL_CODE_RE.is_match(raw) {
            Ok(raw.to_string())
        } else {
            Err(format!(
                "Postal code \"{}\" is invalid (expected format: XXXXX-XXX)",
                raw
            ))
        }
    }

    /// 门牌号仅接受数字；保留原始文本
    pub fn street_number(&self, raw: &str) -> Result<String, String> {
        if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
            Ok(raw.to_string())
        } else {
            Err(format!("Number \"{}\" must be numeric", raw))
        }
    }

    /// 日期解析: ISO → 巴西格式 → 通用回退；并校验年份窗口
    pub fn parse_datetime(&self, raw: &str) -> Result<DateTime<FixedOffset>, DateParseError> {
        let raw = raw.trim();
        let parsed = if ISO_PREFIX_RE.is_match(raw) {
            parse_local(raw, ISO_FORMATS, &["%Y-%m-%d"], self.offset)
        } else if BR_PREFIX_RE.is_match(raw) {
            parse_local(raw, BR_FORMATS, &["%d/%m/%Y"], self.offset)
        } else {
            None
        };

        let value = parsed
            .or_else(|| self.parse_fallback(raw))
            .ok_or(DateParseError::Unrecognized)?;

        let year = value.year();
        if year < self.min_year || year > self.max_year {
            return Err(DateParseError::OutOfRange { year });
        }
        Ok(value)
    }

    fn parse_fallback(&self, raw: &str) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(raw)
            .or_else(|_| DateTime::parse_from_rfc2822(raw))
            .map(|dt| dt.with_timezone(&self.offset))
            .ok()
            .or_else(|| parse_local(raw, FALLBACK_FORMATS, FALLBACK_DATE_FORMATS, self.offset))
    }

    /// 日期错误消息（供校验器与报告使用）
    pub fn date_error_message(&self, raw: &str, err: &DateParseError) -> String {
        match err {
            DateParseError::Unrecognized => format!(
                "Date/time \"{}\" is invalid (accepted formats: YYYY-MM-DD HH:MM, DD/MM/YYYY HH:MM)",
                raw
            ),
            DateParseError::OutOfRange { .. } => format!(
                "Date \"{}\" is outside the accepted range ({}-{})",
                raw, self.min_year, self.max_year
            ),
        }
    }
}

/// 按格式列表解析本地时间，仅日期时取当天 00:00
fn parse_local(
    raw: &str,
    datetime_formats: &[&str],
    date_formats: &[&str],
    offset: FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    let naive = datetime_formats
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            date_formats
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    offset.from_local_datetime(&naive).single()
}
