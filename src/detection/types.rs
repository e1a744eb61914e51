// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测数据结构定义
//! Data structures for per-frame detections

use serde::{Deserialize, Serialize};

// ========== 公共常量 ==========

/// 人员类别名称 (COCO class 0)
pub const PERSON_LABEL: &str = "person";

// ========== 数据结构 ==========

/// 检测框 (Detection bounding box), 像素坐标 x1 < x2, y1 < y2
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// 中心点
    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// 面积 (退化框为 0)
    pub fn area(&self) -> f64 {
        if self.is_valid() {
            self.width() * self.height()
        } else {
            0.0
        }
    }

    /// 坐标有限且宽高为正
    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x2 > self.x1
            && self.y2 > self.y1
    }

    /// 平移 (测试和模拟用)
    pub fn shifted(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }
}

/// 单帧检测结果 (由外部检测器产生)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f64,
    pub class_id: u32,
    pub class_label: String,
}

impl Detection {
    pub fn new(bbox: BBox, confidence: f64, class_id: u32, class_label: impl Into<String>) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            class_label: class_label.into(),
        }
    }

    /// 人员检测
    pub fn person(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> Self {
        Self::new(BBox::new(x1, y1, x2, y2), confidence, 0, PERSON_LABEL)
    }

    pub fn center(&self) -> (f64, f64) {
        self.bbox.center()
    }

    pub fn area(&self) -> f64 {
        self.bbox.area()
    }
}
