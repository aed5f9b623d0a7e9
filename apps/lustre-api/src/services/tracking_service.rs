use lustre_db::models::order::OrderStatus;
use lustre_db::repositories::order_repo::OrderRepository;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Courier callback payload. The external platform only round-trips values
/// it was given at shipment creation, so `order_id` carries our order
/// number, not the internal identifier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourierCallback {
    pub order_id: Option<String>,
    pub awb: Option<String>,
    pub courier_name: Option<String>,
    pub current_status: Option<String>,
    pub shipment_status: Option<String>,
    pub current_location: Option<String>,
    pub remarks: Option<String>,
    pub tracking_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("Callback is missing order_id")]
    MissingOrderId,
    #[error("No order found for order number {0}")]
    UnknownOrder(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct CallbackOutcome {
    pub order_number: String,
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
}

/// Map a courier-reported status string onto the internal vocabulary.
/// Unknown strings map to `None`: the order keeps its current status and the
/// raw text still lands in the audit trail.
pub fn map_courier_status(raw: &str) -> Option<OrderStatus> {
    let normalized = raw.trim().to_uppercase();
    match normalized.as_str() {
        "PICKUP SCHEDULED" | "PICKUP GENERATED" | "PICKUP QUEUED" | "PICKED UP"
        | "PICKUP COMPLETE" => Some(OrderStatus::Processing),
        "SHIPPED" | "IN TRANSIT" | "IN-TRANSIT" | "OUT FOR DELIVERY"
        | "REACHED DESTINATION HUB" => Some(OrderStatus::Shipped),
        "DELIVERED" => Some(OrderStatus::Delivered),
        "CANCELLED" | "CANCELED" => Some(OrderStatus::Cancelled),
        // Any return-to-origin stage ends the order from the buyer's side.
        s if s.starts_with("RTO") => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

/// Reconciles asynchronous courier callbacks onto the order state machine.
/// Transitions are monotonic and idempotent: stale, duplicate, or
/// out-of-order deliveries never move an order backwards or restamp its
/// timestamps.
pub struct TrackingService {
    orders: OrderRepository,
}

impl TrackingService {
    pub fn new(orders: OrderRepository) -> Self {
        Self { orders }
    }

    pub async fn process_callback(
        &self,
        payload: &CourierCallback,
    ) -> Result<CallbackOutcome, TrackingError> {
        let order_number = payload
            .order_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(TrackingError::MissingOrderId)?;

        let mut order = self
            .orders
            .find_by_order_number(order_number)
            .await?
            .ok_or_else(|| TrackingError::UnknownOrder(order_number.to_string()))?;

        let status_text = payload
            .shipment_status
            .as_deref()
            .or(payload.current_status.as_deref())
            .unwrap_or("UNKNOWN")
            .to_string();

        let previous_status = order.status;
        let mapped = map_courier_status(&status_text);
        if mapped.is_none() {
            warn!(
                "Unmapped courier status '{}' for order {}, keeping {}",
                status_text,
                order_number,
                order.status.as_str()
            );
        }

        // The status advance and the audit row commit together. The update
        // is guarded on the expected status, so a concurrent delivery that
        // wins the race costs this one a re-read and another attempt.
        let mut attempts = 0;
        loop {
            let next = match mapped {
                Some(n) if order.status.can_advance_to(n) => Some(n),
                _ => None,
            };

            let mut tx = self.orders.begin().await?;
            if let Some(next) = next {
                if !self
                    .orders
                    .advance_status(&mut tx, order.id, order.status, next)
                    .await?
                {
                    tx.rollback().await.map_err(anyhow::Error::from)?;
                    attempts += 1;
                    if attempts >= 3 {
                        return Err(TrackingError::Storage(anyhow::anyhow!(
                            "Gave up advancing order {} after {} attempts",
                            order_number,
                            attempts
                        )));
                    }
                    order = self
                        .orders
                        .find_by_order_number(order_number)
                        .await?
                        .ok_or_else(|| TrackingError::UnknownOrder(order_number.to_string()))?;
                    continue;
                }
            }

            // Full timeline: append even when the status is unchanged.
            self.orders
                .append_event(
                    &mut tx,
                    order.id,
                    &status_text,
                    payload.current_status.as_deref(),
                    payload.current_location.as_deref(),
                    payload.remarks.as_deref(),
                )
                .await?;
            tx.commit().await.map_err(anyhow::Error::from)?;

            if let Some(next) = next {
                info!(
                    "Order {} advanced {} -> {}",
                    order_number,
                    order.status.as_str(),
                    next.as_str()
                );
                order.status = next;
            }
            break;
        }

        if payload.awb.is_some() || payload.courier_name.is_some() || payload.tracking_url.is_some()
        {
            self.orders
                .backfill_tracking(
                    order.id,
                    payload.awb.as_deref(),
                    payload.courier_name.as_deref(),
                    payload.tracking_url.as_deref(),
                )
                .await?;
        }

        Ok(CallbackOutcome {
            order_number: order_number.to_string(),
            previous_status,
            new_status: order.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lustre_db::db::init_test_db;
    use lustre_db::models::order::{NewOrder, OrderStatus};

    fn draft(order_number: &str, status: OrderStatus) -> NewOrder {
        NewOrder {
            order_number: order_number.to_string(),
            user_id: Some(1),
            customer_email: "test@example.com".to_string(),
            status,
            subtotal: 100_000,
            discount_amount: 0,
            discount_on_delivery: 0,
            delivery_charge: 5_000,
            tax_amount: 18_000,
            total_amount: 123_000,
            coupon_code: None,
            payment_method: "cod".to_string(),
            payment_status: "paid".to_string(),
            razorpay_order_id: None,
            shipping_address: "{}".to_string(),
        }
    }

    fn callback(order_id: &str, status: &str) -> CourierCallback {
        CourierCallback {
            order_id: Some(order_id.to_string()),
            shipment_status: Some(status.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn status_map_covers_courier_vocabulary() {
        assert_eq!(map_courier_status("PICKED UP"), Some(OrderStatus::Processing));
        assert_eq!(map_courier_status("pickup scheduled"), Some(OrderStatus::Processing));
        assert_eq!(map_courier_status("IN TRANSIT"), Some(OrderStatus::Shipped));
        assert_eq!(map_courier_status("Out For Delivery"), Some(OrderStatus::Shipped));
        assert_eq!(map_courier_status("DELIVERED"), Some(OrderStatus::Delivered));
        assert_eq!(map_courier_status("RTO INITIATED"), Some(OrderStatus::Cancelled));
        assert_eq!(map_courier_status("RTO DELIVERED"), Some(OrderStatus::Cancelled));
        assert_eq!(map_courier_status("SOME NEW STATUS"), None);
    }

    #[tokio::test]
    async fn transit_callback_advances_and_is_idempotent() {
        let pool = init_test_db().await.unwrap();
        let repo = OrderRepository::new(pool);
        let id = repo
            .create(&draft("ORD123", OrderStatus::Processing), &[])
            .await
            .unwrap();
        let svc = TrackingService::new(repo.clone());

        let outcome = svc
            .process_callback(&callback("ORD123", "IN TRANSIT"))
            .await
            .unwrap();
        assert_eq!(outcome.previous_status, OrderStatus::Processing);
        assert_eq!(outcome.new_status, OrderStatus::Shipped);

        let order = repo.find_by_order_number("ORD123").await.unwrap().unwrap();
        let first_shipped_at = order.shipped_at.expect("shipped_at stamped");

        // Replay of the same callback: status and timestamp stable, only the
        // audit trail grows.
        svc.process_callback(&callback("ORD123", "IN TRANSIT"))
            .await
            .unwrap();
        let order = repo.find_by_order_number("ORD123").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.shipped_at, Some(first_shipped_at));
        assert_eq!(repo.get_events(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stale_callback_never_regresses_status() {
        let pool = init_test_db().await.unwrap();
        let repo = OrderRepository::new(pool);
        let id = repo
            .create(&draft("ORD124", OrderStatus::Delivered), &[])
            .await
            .unwrap();
        let svc = TrackingService::new(repo.clone());

        let outcome = svc
            .process_callback(&callback("ORD124", "PICKED UP"))
            .await
            .unwrap();
        assert_eq!(outcome.new_status, OrderStatus::Delivered);

        let order = repo.find_by_order_number("ORD124").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);
        // the late event is still recorded
        assert_eq!(repo.get_events(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_status_keeps_current_and_logs_event() {
        let pool = init_test_db().await.unwrap();
        let repo = OrderRepository::new(pool);
        let id = repo
            .create(&draft("ORD125", OrderStatus::Shipped), &[])
            .await
            .unwrap();
        let svc = TrackingService::new(repo.clone());

        svc.process_callback(&callback("ORD125", "MISROUTED AT HUB"))
            .await
            .unwrap();
        let order = repo.find_by_order_number("ORD125").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        let events = repo.get_events(id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status_text, "MISROUTED AT HUB");
    }

    #[tokio::test]
    async fn missing_or_unknown_order_rejected() {
        let pool = init_test_db().await.unwrap();
        let repo = OrderRepository::new(pool);
        let svc = TrackingService::new(repo);

        let err = svc.process_callback(&CourierCallback::default()).await.unwrap_err();
        assert!(matches!(err, TrackingError::MissingOrderId));

        let err = svc
            .process_callback(&callback("NOPE", "DELIVERED"))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::UnknownOrder(_)));
    }

    #[tokio::test]
    async fn rto_cancels_in_flight_order() {
        let pool = init_test_db().await.unwrap();
        let repo = OrderRepository::new(pool);
        repo.create(&draft("ORD126", OrderStatus::Shipped), &[])
            .await
            .unwrap();
        let svc = TrackingService::new(repo.clone());

        svc.process_callback(&callback("ORD126", "RTO INITIATED"))
            .await
            .unwrap();
        let order = repo.find_by_order_number("ORD126").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn first_callback_wins_tracking_url() {
        let pool = init_test_db().await.unwrap();
        let repo = OrderRepository::new(pool);
        repo.create(&draft("ORD127", OrderStatus::Processing), &[])
            .await
            .unwrap();
        let svc = TrackingService::new(repo.clone());

        let mut cb = callback("ORD127", "IN TRANSIT");
        cb.awb = Some("AWB-1".to_string());
        cb.tracking_url = Some("https://track/1".to_string());
        svc.process_callback(&cb).await.unwrap();

        let mut cb2 = callback("ORD127", "OUT FOR DELIVERY");
        cb2.tracking_url = Some("https://track/2".to_string());
        svc.process_callback(&cb2).await.unwrap();

        let order = repo.find_by_order_number("ORD127").await.unwrap().unwrap();
        assert_eq!(order.tracking_url.as_deref(), Some("https://track/1"));
        assert_eq!(order.awb_code.as_deref(), Some("AWB-1"));
    }
}
