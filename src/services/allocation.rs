use crate::entities::PacketMode;
use rand::Rng;

/// 计算本次领取金额（分）
///
/// 输入为当前快照的剩余个数 / 剩余金额；调用方保证
/// remain_count >= 1 且 remain_amount_cents >= remain_count * minimum_unit_cents。
pub fn share_amount(
    mode: PacketMode,
    remain_count: i64,
    remain_amount_cents: i64,
    minimum_unit_cents: i64,
    rng: &mut impl Rng,
) -> i64 {
    // 最后一个包拿走全部剩余，不留残余
    if remain_count == 1 {
        return remain_amount_cents;
    }

    match mode {
        // 平均分配，按当前剩余重新计算而非预先均分
        PacketMode::Even => remain_amount_cents / remain_count,
        PacketMode::Lucky => {
            // 手气红包，在最小值和剩余平均值 * 2 之间随机选取
            // 要注意最大值，需要至少给剩下的人留最小值
            let min = minimum_unit_cents;
            let mut max = remain_amount_cents - (remain_count - 1) * min;
            let avg = remain_amount_cents / remain_count;
            if 2 * avg < max {
                max = 2 * avg;
            }

            // 向零截断，向上取整会吃掉给后面的人预留的金额
            let random: f64 = rng.random();
            min + ((max - min) as f64 * random) as i64
        }
    }
}
