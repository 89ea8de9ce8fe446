//! 健身房与坐标
//!
//! 健身房目录由外部系统维护，这里只保留打卡校验需要的字段

use serde::{Deserialize, Serialize};

use crate::error::{GamificationError, Result};

/// WGS84 坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// 坐标必须是有限值且在经纬度范围内
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(GamificationError::Validation(format!(
                "latitude 超出范围: {}",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(GamificationError::Validation(format!(
                "longitude 超出范围: {}",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// 健身房
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Gym {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// 围栏半径（米），未配置时使用默认值
    #[sqlx(default)]
    pub geofence_radius_meters: Option<f64>,
    pub is_active: bool,
}

impl Gym {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    pub fn radius_meters(&self, default_radius: f64) -> f64 {
        match self.geofence_radius_meters {
            Some(radius) if radius > 0.0 => radius,
            _ => default_radius,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_validation() {
        assert!(Coordinates::new(90.0, -180.0).validate().is_ok());
        assert!(Coordinates::new(-90.1, 0.0).validate().is_err());
        assert!(Coordinates::new(0.0, 180.5).validate().is_err());
        assert!(Coordinates::new(f64::INFINITY, 0.0).validate().is_err());
    }

    #[test]
    fn test_radius_fallback() {
        let mut gym = Gym {
            id: 1,
            name: "Norte".into(),
            latitude: 0.0,
            longitude: 0.0,
            geofence_radius_meters: None,
            is_active: true,
        };
        assert_eq!(gym.radius_meters(150.0), 150.0);
        gym.geofence_radius_meters = Some(80.0);
        assert_eq!(gym.radius_meters(150.0), 80.0);
        gym.geofence_radius_meters = Some(0.0);
        assert_eq!(gym.radius_meters(150.0), 150.0);
    }
}
