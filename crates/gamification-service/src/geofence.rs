//! 地理围栏校验
//!
//! 几何判定（距离、精度）是纯函数；订阅状态交给外部会员目录，
//! 且只有几何判定通过后才会查询。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{GamificationError, Result};
use crate::models::{Coordinates, Gym};
use crate::repository::MembershipDirectory;
use crate::settings::GeofenceSettings;

/// 地球平均半径（米）
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// 打卡被拒原因
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeofenceRejection {
    /// 距离超出健身房围栏半径
    #[serde(rename_all = "camelCase")]
    OutOfRange {
        distance_meters: f64,
        radius_meters: f64,
    },
    /// 定位精度不足
    #[serde(rename_all = "camelCase")]
    GpsInaccurate {
        accuracy_meters: f64,
        max_accuracy_meters: f64,
    },
    /// 没有该健身房的有效订阅
    SubscriptionRequired,
}

impl GeofenceRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::GpsInaccurate { .. } => "GPS_INACCURATE",
            Self::SubscriptionRequired => "SUBSCRIPTION_REQUIRED",
        }
    }
}

impl std::fmt::Display for GeofenceRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange {
                distance_meters,
                radius_meters,
            } => write!(
                f,
                "不在健身房范围内: 距离 {:.0} 米, 允许 {:.0} 米",
                distance_meters, radius_meters
            ),
            Self::GpsInaccurate {
                accuracy_meters,
                max_accuracy_meters,
            } => write!(
                f,
                "定位精度不足: {:.0} 米, 要求不超过 {:.0} 米",
                accuracy_meters, max_accuracy_meters
            ),
            Self::SubscriptionRequired => f.write_str("需要该健身房的有效订阅"),
        }
    }
}

/// 校验结果
#[derive(Debug, Clone, PartialEq)]
pub enum GeofenceDecision {
    Admit { distance_meters: f64 },
    Reject(GeofenceRejection),
}

impl GeofenceDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit { .. })
    }

    /// 转为结果，拒绝时返回 `CheckInRejected`
    pub fn into_result(self) -> Result<f64> {
        match self {
            Self::Admit { distance_meters } => Ok(distance_meters),
            Self::Reject(rejection) => Err(GamificationError::CheckInRejected(rejection)),
        }
    }
}

/// 两点间大圆距离（Haversine）
pub fn haversine_distance_meters(a: &Coordinates, b: &Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// 纯几何判定：先判距离再判精度
///
/// 精度缺省时按配置上限处理，恰好等于上限视为合格。
pub fn evaluate_position(
    position: &Coordinates,
    accuracy: Option<f64>,
    gym: &Gym,
    settings: &GeofenceSettings,
) -> Result<GeofenceDecision> {
    position.validate()?;
    let accuracy = accuracy.unwrap_or(settings.max_accuracy_meters);
    if !accuracy.is_finite() || accuracy < 0.0 {
        return Err(GamificationError::Validation(format!(
            "accuracy 必须为非负数: {}",
            accuracy
        )));
    }

    let radius_meters = gym.radius_meters(settings.default_radius_meters);
    let distance_meters = haversine_distance_meters(position, &gym.coordinates());

    if distance_meters > radius_meters {
        return Ok(GeofenceDecision::Reject(GeofenceRejection::OutOfRange {
            distance_meters,
            radius_meters,
        }));
    }
    if accuracy > settings.max_accuracy_meters {
        return Ok(GeofenceDecision::Reject(GeofenceRejection::GpsInaccurate {
            accuracy_meters: accuracy,
            max_accuracy_meters: settings.max_accuracy_meters,
        }));
    }

    Ok(GeofenceDecision::Admit { distance_meters })
}

/// 地理围栏校验器
#[derive(Clone)]
pub struct GeofenceValidator {
    membership: Arc<dyn MembershipDirectory>,
    settings: GeofenceSettings,
}

impl GeofenceValidator {
    pub fn new(membership: Arc<dyn MembershipDirectory>, settings: GeofenceSettings) -> Self {
        Self {
            membership,
            settings,
        }
    }

    /// 完整校验：几何判定通过后再查询订阅
    #[instrument(skip(self, position, gym), fields(gym_id = gym.id))]
    pub async fn validate(
        &self,
        user_id: &str,
        position: &Coordinates,
        accuracy: Option<f64>,
        gym: &Gym,
        at: DateTime<Utc>,
    ) -> Result<GeofenceDecision> {
        let decision = evaluate_position(position, accuracy, gym, &self.settings)?;
        if !decision.is_admitted() {
            debug!(?decision, "几何校验未通过");
            return Ok(decision);
        }

        if !self
            .membership
            .has_active_subscription(user_id, gym.id, at)
            .await?
        {
            return Ok(GeofenceDecision::Reject(
                GeofenceRejection::SubscriptionRequired,
            ));
        }

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockMembershipDirectory;

    fn gym(radius: Option<f64>) -> Gym {
        Gym {
            id: 1,
            name: "Centro".to_string(),
            latitude: 4.6097,
            longitude: -74.0817,
            geofence_radius_meters: radius,
            is_active: true,
        }
    }

    /// 从健身房位置向北偏移若干米
    fn north_of(gym: &Gym, meters: f64) -> Coordinates {
        let d_lat = (meters / EARTH_RADIUS_METERS).to_degrees();
        Coordinates {
            latitude: gym.latitude + d_lat,
            longitude: gym.longitude,
        }
    }

    #[test]
    fn test_haversine_known_distance() {
        // 波哥大 -> 麦德林 约 240 公里
        let bogota = Coordinates { latitude: 4.7110, longitude: -74.0721 };
        let medellin = Coordinates { latitude: 6.2442, longitude: -75.5812 };
        let d = haversine_distance_meters(&bogota, &medellin);
        assert!((d - 240_000.0).abs() < 5_000.0, "distance = {d}");
        assert_eq!(haversine_distance_meters(&bogota, &bogota), 0.0);
    }

    #[test]
    fn test_inside_radius_admitted() {
        let gym = gym(Some(100.0));
        let decision =
            evaluate_position(&north_of(&gym, 50.0), Some(10.0), &gym, &GeofenceSettings::default())
                .unwrap();
        assert!(decision.is_admitted());
    }

    #[test]
    fn test_out_of_range_wins_over_inaccurate() {
        let gym = gym(Some(100.0));
        let decision =
            evaluate_position(&north_of(&gym, 500.0), Some(500.0), &gym, &GeofenceSettings::default())
                .unwrap();
        assert!(matches!(
            decision,
            GeofenceDecision::Reject(GeofenceRejection::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_inaccurate_inside_radius() {
        let gym = gym(Some(100.0));
        let decision =
            evaluate_position(&north_of(&gym, 10.0), Some(80.0), &gym, &GeofenceSettings::default())
                .unwrap();
        assert_eq!(decision.into_result().unwrap_err().error_code(), "GPS_INACCURATE");
    }

    #[test]
    fn test_missing_accuracy_uses_max() {
        let gym = gym(None);
        let settings = GeofenceSettings::default();
        let decision = evaluate_position(&north_of(&gym, 10.0), None, &gym, &settings).unwrap();
        assert!(decision.is_admitted());

        // 未配置半径的健身房使用默认半径
        let decision = evaluate_position(&north_of(&gym, 200.0), None, &gym, &settings).unwrap();
        assert!(!decision.is_admitted());
    }

    #[test]
    fn test_invalid_input_is_validation_error() {
        let gym = gym(None);
        let settings = GeofenceSettings::default();
        let bad = Coordinates { latitude: 91.0, longitude: 0.0 };
        assert!(matches!(
            evaluate_position(&bad, Some(5.0), &gym, &settings),
            Err(GamificationError::Validation(_))
        ));

        let here = north_of(&gym, 0.0);
        assert!(matches!(
            evaluate_position(&here, Some(-1.0), &gym, &settings),
            Err(GamificationError::Validation(_))
        ));
        assert!(matches!(
            evaluate_position(&here, Some(f64::NAN), &gym, &settings),
            Err(GamificationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_subscription_checked_only_after_geometry() {
        let mut membership = MockMembershipDirectory::new();
        membership.expect_has_active_subscription().times(0);
        let validator = GeofenceValidator::new(Arc::new(membership), GeofenceSettings::default());

        let gym = gym(Some(100.0));
        let decision = validator
            .validate("u-1", &north_of(&gym, 1_000.0), Some(5.0), &gym, Utc::now())
            .await
            .unwrap();
        assert!(!decision.is_admitted());
    }

    #[tokio::test]
    async fn test_subscription_required() {
        let mut membership = MockMembershipDirectory::new();
        membership
            .expect_has_active_subscription()
            .times(1)
            .returning(|_, _, _| Ok(false));
        let validator = GeofenceValidator::new(Arc::new(membership), GeofenceSettings::default());

        let gym = gym(Some(100.0));
        let decision = validator
            .validate("u-1", &north_of(&gym, 20.0), Some(5.0), &gym, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            decision,
            GeofenceDecision::Reject(GeofenceRejection::SubscriptionRequired)
        );
    }

    #[tokio::test]
    async fn test_admitted_with_subscription() {
        let mut membership = MockMembershipDirectory::new();
        membership
            .expect_has_active_subscription()
            .returning(|_, gym_id, _| Ok(gym_id == 1));
        let validator = GeofenceValidator::new(Arc::new(membership), GeofenceSettings::default());

        let gym = gym(Some(100.0));
        let distance = validator
            .validate("u-1", &north_of(&gym, 20.0), Some(5.0), &gym, Utc::now())
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert!((distance - 20.0).abs() < 0.5);
    }
}
