//! Live WebSocket endpoint: 订单实时推送
//!
//! GET /api/live/ws?topic=<order:ID | restaurant:ID>
//! 身份来自 `x-actor-id` / `x-restaurant-id` 头，订阅在升级前完成，
//! 所以跨租户或不存在的订单直接返回 HTTP 错误而不是建立连接。
//!
//! 协议:
//! - Server → Client: `OrderEvent` JSON 文本帧，每 30 秒一个 Ping
//! - Client → Server: 只处理 Close / Pong，其它忽略
//!
//! 推送是 at-least-once 的增量流；客户端按 `revision` 丢弃旧事件，
//! 断线后自行重连并通过读接口重新加载。

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::{Router, routing::get};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::AppError;
use shared::order::Topic;
use tokio::time::Duration;

use crate::api::extractor::CurrentActor;
use crate::core::ServerState;
use crate::live::{EventReceiver, Observer, Subscription};

const PING_INTERVAL: Duration = Duration::from_secs(30);

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/live/ws", get(handle_live_ws))
}

#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    topic: String,
}

/// 校验 topic 并在 registry 中登记 observer
pub fn open_subscription(
    state: &ServerState,
    actor: &CurrentActor,
    raw_topic: &str,
) -> Result<(Subscription, EventReceiver), AppError> {
    let topic = Topic::parse(raw_topic, &actor.restaurant_id)
        .map_err(|e| AppError::invalid_request(e.to_string()).with_detail("topic", raw_topic))?;

    // order:<id> 不携带租户，必须确认订单真的属于调用方
    if let Topic::Order { order_id, .. } = &topic {
        match state.orders.get_order(order_id)? {
            Some(order) if order.restaurant_id == actor.restaurant_id => {}
            _ => return Err(AppError::order_not_found(order_id.as_str())),
        }
    }

    let observer_id = format!("{}:{}", actor.actor_id, uuid::Uuid::new_v4());
    let (observer, rx) = Observer::channel(observer_id, state.config.observer_queue_capacity);
    let subscription = state
        .registry
        .subscribe(&actor.restaurant_id, topic, observer)?;
    Ok((subscription, rx))
}

/// GET /api/live/ws?topic=...
pub async fn handle_live_ws(
    State(state): State<ServerState>,
    actor: CurrentActor,
    Query(query): Query<LiveQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let (subscription, rx) = open_subscription(&state, &actor, &query.topic)?;
    Ok(ws.on_upgrade(move |socket| live_ws_session(socket, state, subscription, rx)))
}

async fn live_ws_session(
    socket: WebSocket,
    state: ServerState,
    subscription: Subscription,
    mut rx: EventReceiver,
) {
    let (mut sink, mut stream) = socket.split();
    let topic = subscription.topic().to_string();
    let observer_id = subscription.observer_id().to_string();

    tracing::info!(topic = %topic, observer_id = %observer_id, "Live WS connected");

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await; // skip immediate

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }

            event = rx.recv() => {
                let Some(event) = event else {
                    // registry 已移除该 observer
                    break;
                };
                match serde_json::to_string(event.as_ref()) {
                    Ok(text) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, order_id = %event.order_id, "Failed to encode order event");
                    }
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }

            _ = state.shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    subscription.unsubscribe();
    tracing::info!(topic = %topic, observer_id = %observer_id, "Live WS disconnected");
}
