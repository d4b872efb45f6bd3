use blotter_sdk::service::{BlotterEvent, OrderEvent, ExecutionEvent};
use blotter_sdk::{EventId, EventKind, OrderPayload, OrderState, Side};

fn main() {
    let ev = OrderEvent {
        event_type: EventKind::Update,
        order_id: "O-7".into(),
        event_id: EventId::new(7),
        sequence_number: Some(3),
        timestamp: "2024-05-02T09:30:00Z".parse().unwrap(),
        order: OrderPayload {
            order_id: "O-7".into(),
            symbol: Some("INTC".into()),
            side: Some(Side::Buy),
            state: Some(OrderState::Live),
            ..Default::default()
        },
    };
    let be = BlotterEvent::Order(ev.clone());
    let json = serde_json::to_string(&be).unwrap();
    println!("{}", json);
    let direct: Result<OrderEvent, _> = serde_json::from_str(&json);
    println!("direct OrderEvent: {:?}", direct.is_ok());
    let direct_exec: Result<ExecutionEvent, _> = serde_json::from_str(&json);
    match &direct_exec {
        Ok(_) => println!("direct ExecutionEvent: ok"),
        Err(e) => println!("direct ExecutionEvent err: {}", e),
    }
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    let via_value_order: Result<OrderEvent, _> = serde_json::from_value(v.clone());
    println!("via value OrderEvent: {:?}", via_value_order.is_ok());
    if let Err(e) = &via_value_order {
        println!("err: {}", e);
    }
}
