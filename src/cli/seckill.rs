use crate::app::App;
use crate::cli::{PublishVoucherArgs, SeckillArgs};
use crate::seckill::{SeckillOutcome, SeckillVoucher, UserContext};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use futures::future::join_all;

async fn publish_voucher(app: &App, voucher_id: i64, stock: i32, hours: i64) -> Result<()> {
    let now = Utc::now();
    let voucher = SeckillVoucher {
        voucher_id,
        stock,
        begin_time: now,
        end_time: now + Duration::hours(hours),
    };
    app.pipeline
        .publish_voucher(&app.vouchers, &voucher)
        .await
        .with_context(|| format!("Failed to publish voucher {}", voucher_id))
}

pub async fn publish(app: &App, args: &PublishVoucherArgs) -> Result<()> {
    publish_voucher(app, args.voucher_id, args.stock, args.hours).await?;
    println!(
        "✅ Voucher {} published with stock {}.",
        args.voucher_id, args.stock
    );
    Ok(())
}

pub async fn execute(app: &App, args: &SeckillArgs) -> Result<()> {
    if let Some(stock) = args.stock {
        publish_voucher(app, args.voucher_id, stock, 24).await?;
    }

    let attempts = (0..args.users as i64).map(|offset| {
        let user = UserContext::new(args.user_id + offset);
        async move {
            let outcome = app
                .pipeline
                .acquire_seckill_order(&user, args.voucher_id)
                .await;
            (user, outcome)
        }
    });

    let mut admitted = 0;
    for (user, outcome) in join_all(attempts).await {
        match outcome.with_context(|| format!("Seckill failed for user {}", user.user_id))? {
            SeckillOutcome::Admitted { order_id } => {
                admitted += 1;
                println!("user {:<8} ✅ admitted, order {}", user.user_id, order_id);
            }
            SeckillOutcome::Rejected(reason) => {
                println!(
                    "user {:<8} ❌ rejected (code {}): {}",
                    user.user_id,
                    reason.code(),
                    reason
                );
            }
        }
    }
    println!("Admitted {}/{} requests.", admitted, args.users);
    Ok(())
}
