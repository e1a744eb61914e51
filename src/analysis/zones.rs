// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 区域划分 (Zone classification)
//!
//! 区域使用归一化矩形配置, 分类时按实际画面尺寸换算成像素坐标。

use serde::{Deserialize, Serialize};

use crate::config::ZoneLayout;
use crate::detection::TrackPoint;
use crate::error::{AnalyticsError, Result};

pub const ENTRY: &str = "entry";
pub const EXIT: &str = "exit";
pub const CHECKOUT: &str = "checkout";
/// 不属于任何配置区域
pub const MAIN_AREA: &str = "main_area";

/// 归一化矩形 [0, 1]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneRect {
    pub x_start: f64,
    pub x_end: f64,
    pub y_start: f64,
    pub y_end: f64,
}

impl ZoneRect {
    pub fn new(x_start: f64, x_end: f64, y_start: f64, y_end: f64) -> Self {
        Self {
            x_start,
            x_end,
            y_start,
            y_end,
        }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        let coords = [self.x_start, self.x_end, self.y_start, self.y_end];
        if coords.iter().any(|v| !v.is_finite()) {
            return Err(AnalyticsError::zone(name, "coordinates must be finite"));
        }
        if self.x_start >= self.x_end {
            return Err(AnalyticsError::zone(
                name,
                format!("x_start {} must be below x_end {}", self.x_start, self.x_end),
            ));
        }
        if self.y_start >= self.y_end {
            return Err(AnalyticsError::zone(
                name,
                format!("y_start {} must be below y_end {}", self.y_start, self.y_end),
            ));
        }
        Ok(())
    }

    /// 换算为像素坐标 (x_min, x_max, y_min, y_max), 向下取整
    pub fn to_pixels(&self, width: u32, height: u32) -> (f64, f64, f64, f64) {
        let (w, h) = (width as f64, height as f64);
        (
            (self.x_start * w).floor(),
            (self.x_end * w).floor(),
            (self.y_start * h).floor(),
            (self.y_end * h).floor(),
        )
    }

    /// 点是否在区域内 (含边界)
    pub fn contains(&self, point: TrackPoint, width: u32, height: u32) -> bool {
        let (x_min, x_max, y_min, y_max) = self.to_pixels(width, height);
        x_min <= point.x && point.x <= x_max && y_min <= point.y && point.y <= y_max
    }
}

/// 命名区域
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub rect: ZoneRect,
}

impl Zone {
    pub fn new(name: impl Into<String>, rect: ZoneRect) -> Self {
        Self {
            name: name.into(),
            rect,
        }
    }
}

/// 区域分类器
///
/// 构造后不可变, 可通过 `Arc` 在多路摄像头之间共享。
#[derive(Clone, Debug)]
pub struct ZoneClassifier {
    /// 按优先级排列
    zones: Vec<Zone>,
}

impl ZoneClassifier {
    /// 按给定顺序构造 (先匹配者优先)
    pub fn new(zones: Vec<Zone>) -> Result<Self> {
        for zone in &zones {
            zone.rect.validate(&zone.name)?;
        }
        Ok(Self { zones })
    }

    /// entry → exit → checkout
    pub fn from_layout(layout: &ZoneLayout) -> Result<Self> {
        Self::new(vec![
            Zone::new(ENTRY, layout.entry),
            Zone::new(EXIT, layout.exit),
            Zone::new(CHECKOUT, layout.checkout),
        ])
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// 返回点所在区域名称
    pub fn classify(&self, point: TrackPoint, frame_width: u32, frame_height: u32) -> &str {
        self.zones
            .iter()
            .find(|z| z.rect.contains(point, frame_width, frame_height))
            .map(|z| z.name.as_str())
            .unwrap_or(MAIN_AREA)
    }
}

impl Default for ZoneClassifier {
    fn default() -> Self {
        let layout = ZoneLayout::default();
        Self {
            zones: vec![
                Zone::new(ENTRY, layout.entry),
                Zone::new(EXIT, layout.exit),
                Zone::new(CHECKOUT, layout.checkout),
            ],
        }
    }
}
