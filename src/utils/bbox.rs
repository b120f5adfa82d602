use crate::Errors::{BBoxConversion, InvalidDetection};
use crate::{EstimateClose, EPS};
use anyhow::Result;

/// Bounding box in the format (left, top, width, height)
///
#[derive(Clone, Default, Debug, Copy)]
pub struct BoundingBox {
    _x: f32,
    _y: f32,
    _width: f32,
    _height: f32,
}

impl BoundingBox {
    /// Constructor
    ///
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            _x: x,
            _y: y,
            _width: width,
            _height: height,
        }
    }

    /// Constructor that rejects non-finite coordinates and non-positive sizes
    ///
    pub fn checked(x: f32, y: f32, width: f32, height: f32) -> Result<Self> {
        if ![x, y, width, height].iter().all(|v| v.is_finite()) {
            return Err(InvalidDetection(format!(
                "non-finite box coordinates ({x}, {y}, {width}, {height})"
            ))
            .into());
        }

        if width <= 0.0 || height <= 0.0 {
            return Err(InvalidDetection(format!(
                "box size must be positive, got {width}x{height}"
            ))
            .into());
        }

        Ok(Self::new(x, y, width, height))
    }

    pub fn x(&self) -> f32 {
        self._x
    }

    pub fn y(&self) -> f32 {
        self._y
    }

    pub fn width(&self) -> f32 {
        self._width
    }

    pub fn height(&self) -> f32 {
        self._height
    }

    pub fn area(&self) -> f32 {
        self._width * self._height
    }

    pub fn as_xyah(&self) -> Universal2DBox {
        Universal2DBox::from(self)
    }

    pub fn intersection(l: &BoundingBox, r: &BoundingBox) -> f32 {
        let (ax0, ay0, ax1, ay1) = (l._x, l._y, l._x + l._width, l._y + l._height);
        let (bx0, by0, bx1, by1) = (r._x, r._y, r._x + r._width, r._y + r._height);

        let (x1, y1) = (ax0.max(bx0), ay0.max(by0));
        let (x2, y2) = (ax1.min(bx1), ay1.min(by1));

        let int_width = x2 - x1;
        let int_height = y2 - y1;

        if int_width > 0.0 && int_height > 0.0 {
            int_width * int_height
        } else {
            0.0
        }
    }

    /// Intersection over union, `0.0` for disjoint or degenerate boxes
    ///
    pub fn iou(l: &BoundingBox, r: &BoundingBox) -> f32 {
        let intersection = BoundingBox::intersection(l, r);
        let union = l.area() + r.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

impl EstimateClose for BoundingBox {
    fn almost_same(&self, other: &Self, eps: f32) -> bool {
        (self._x - other._x).abs() < eps
            && (self._y - other._y).abs() < eps
            && (self._width - other._width).abs() < eps
            && (self._height - other._height).abs() < eps
    }
}

impl PartialEq<Self> for BoundingBox {
    fn eq(&self, other: &Self) -> bool {
        self.almost_same(other, EPS)
    }
}

/// Bounding box in the format (center x, center y, aspect, height) - the measurement
/// space of the kalman filter
///
#[derive(Clone, Default, Debug, Copy)]
pub struct Universal2DBox {
    pub xc: f32,
    pub yc: f32,
    pub aspect: f32,
    pub height: f32,
}

impl Universal2DBox {
    pub fn new(xc: f32, yc: f32, aspect: f32, height: f32) -> Self {
        Self {
            xc,
            yc,
            aspect,
            height,
        }
    }

    pub fn area(&self) -> f32 {
        let w = self.height * self.aspect;
        w * self.height
    }

    /// This is a lossy translation. Predicted states may drift to a non-positive
    /// height, such boxes cannot be represented as `BoundingBox`.
    ///
    pub fn as_ltwh(&self) -> Result<BoundingBox> {
        BoundingBox::try_from(self)
    }
}

impl EstimateClose for Universal2DBox {
    fn almost_same(&self, other: &Self, eps: f32) -> bool {
        (self.xc - other.xc).abs() < eps
            && (self.yc - other.yc).abs() < eps
            && (self.aspect - other.aspect).abs() < eps
            && (self.height - other.height).abs() < eps
    }
}

impl PartialEq<Self> for Universal2DBox {
    fn eq(&self, other: &Self) -> bool {
        self.almost_same(other, EPS)
    }
}

impl From<BoundingBox> for Universal2DBox {
    fn from(f: BoundingBox) -> Self {
        Universal2DBox::from(&f)
    }
}

impl From<&BoundingBox> for Universal2DBox {
    fn from(f: &BoundingBox) -> Self {
        Universal2DBox {
            xc: f._x + f._width / 2.0,
            yc: f._y + f._height / 2.0,
            aspect: f._width / f._height,
            height: f._height,
        }
    }
}

impl TryFrom<&Universal2DBox> for BoundingBox {
    type Error = anyhow::Error;

    fn try_from(f: &Universal2DBox) -> Result<Self> {
        if f.height <= 0.0 || !f.height.is_finite() {
            return Err(BBoxConversion.into());
        }
        let width = f.height * f.aspect;
        Ok(BoundingBox {
            _x: f.xc - width / 2.0,
            _y: f.yc - f.height / 2.0,
            _width: width,
            _height: f.height,
        })
    }
}

impl TryFrom<Universal2DBox> for BoundingBox {
    type Error = anyhow::Error;

    fn try_from(f: Universal2DBox) -> Result<Self> {
        BoundingBox::try_from(&f)
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::bbox::{BoundingBox, Universal2DBox};
    use crate::{Errors, EPS};

    #[test]
    fn test_iou() {
        let bb1 = BoundingBox::new(-1.0, -1.0, 2.0, 2.0);
        let bb2 = BoundingBox::new(-0.9, -0.9, 2.0, 2.0);
        let bb3 = BoundingBox::new(1.0, 1.0, 3.0, 3.0);

        assert!(BoundingBox::iou(&bb1, &bb1) > 0.999);
        assert!(BoundingBox::iou(&bb2, &bb2) > 0.999);
        assert!(BoundingBox::iou(&bb1, &bb2) > 0.8);
        assert!(BoundingBox::iou(&bb1, &bb3) < 0.001);
        assert!(BoundingBox::iou(&bb2, &bb3) < 0.001);
    }

    #[test]
    fn half_overlap() {
        let bb1 = BoundingBox::new(0.0, 0.0, 2.0, 2.0);
        let bb2 = BoundingBox::new(1.0, 0.0, 2.0, 2.0);
        assert!((BoundingBox::iou(&bb1, &bb2) - 1.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn xyah_roundtrip() {
        let bbox = BoundingBox::new(10.0, 10.0, 20.0, 40.0);
        let xyah = bbox.as_xyah();
        assert_eq!(xyah, Universal2DBox::new(20.0, 30.0, 0.5, 40.0));
        assert_eq!(xyah.as_ltwh().unwrap(), bbox);
    }

    #[test]
    fn degenerate_height() {
        let err = Universal2DBox::new(1.0, 1.0, 1.0, -1.0).as_ltwh().unwrap_err();
        assert_eq!(err.downcast_ref::<Errors>(), Some(&Errors::BBoxConversion));
    }

    #[test]
    fn checked_constructor() {
        assert!(BoundingBox::checked(0.0, 0.0, 1.0, 1.0).is_ok());
        assert!(BoundingBox::checked(f32::NAN, 0.0, 1.0, 1.0).is_err());
        assert!(BoundingBox::checked(0.0, f32::INFINITY, 1.0, 1.0).is_err());
        assert!(BoundingBox::checked(0.0, 0.0, 0.0, 1.0).is_err());
        assert!(BoundingBox::checked(0.0, 0.0, 1.0, -2.0).is_err());
    }
}
