//! 报文 ID 常量定义

// ============================================================================
// GPS 报文（CAN 总线）
// ============================================================================

/// 卫星数 / UTC 时间 / 纬度
pub const ID_GPS_POSITION_X: u32 = 0x301;
/// 经度 / 速度 / 航向
pub const ID_GPS_POSITION_Y: u32 = 0x302;
/// 海拔 / 垂直速度 / 状态
pub const ID_GPS_ALTITUDE: u32 = 0x303;
/// 触发距离 / 纵向加速度 / 横向加速度
pub const ID_GPS_ACCELERATION: u32 = 0x304;
/// 里程 / 触发时间 / 触发速度
pub const ID_GPS_DISTANCE: u32 = 0x305;

/// GPS 报文 ID 范围（含两端）
pub const GPS_ID_RANGE: std::ops::RangeInclusive<u32> = ID_GPS_POSITION_X..=ID_GPS_DISTANCE;

/// GPS 报文种类数（每个 ID 一个槽位）
pub const GPS_MESSAGE_KINDS: usize = 5;

// ============================================================================
// 惯性传感器（串口）
// ============================================================================

/// 惯性传感器帧的逻辑 ID（不走 CAN 总线，仅用于统一解码入口）
pub const ID_INERTIAL: u32 = 0x306;

/// 判断是否为 GPS 报文
pub fn is_gps_id(id: u32) -> bool {
    GPS_ID_RANGE.contains(&id)
}

/// GPS 报文在 0x301..=0x305 中的槽位下标
pub fn gps_slot(id: u32) -> Option<usize> {
    if is_gps_id(id) {
        Some((id - ID_GPS_POSITION_X) as usize)
    } else {
        None
    }
}
