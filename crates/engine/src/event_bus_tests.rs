use super::*;
use meow_core::{AgentId, RunId};
use std::time::Duration;

fn event(event_type: &str, data: HashMap<String, Value>) -> Event {
    Event {
        event_type: event_type.to_string(),
        data,
        agent: AgentId::new("w1"),
        run: RunId::new("run-1"),
        timestamp: 0,
    }
}

#[tokio::test]
async fn subscribe_matches_published_event() {
    let bus = EventBus::new();
    let filter = HashMap::from([("tool".to_string(), Value::String("Bash".to_string()))]);
    let publish_event = event(
        "tool-completed",
        HashMap::from([("tool".to_string(), Value::String("Bash".to_string()))]),
    );

    let subscribe_fut = bus.subscribe("tool-completed", filter, Duration::from_millis(200));
    let publish_fut = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.publish(publish_event.clone());
    };

    let (result, ()) = tokio::join!(subscribe_fut, publish_fut);
    assert_eq!(result.unwrap(), publish_event);
}

#[tokio::test]
async fn subscribe_ignores_non_matching_then_matches_second_event() {
    let bus = EventBus::new();
    let filter = HashMap::from([("tool".to_string(), Value::String("Bash".to_string()))]);
    let subscribe_fut = bus.subscribe("tool-completed", filter, Duration::from_millis(300));

    let publish_fut = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.publish(event(
            "tool-completed",
            HashMap::from([("tool".to_string(), Value::String("Read".to_string()))]),
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.publish(event(
            "tool-completed",
            HashMap::from([
                ("tool".to_string(), Value::String("Bash".to_string())),
                ("exit_code".to_string(), Value::from(0)),
            ]),
        ));
    };

    let (result, ()) = tokio::join!(subscribe_fut, publish_fut);
    let matched = result.unwrap();
    assert_eq!(matched.data.get("tool"), Some(&Value::String("Bash".to_string())));
}

#[tokio::test]
async fn subscribe_times_out_within_bound() {
    let bus = EventBus::new();
    let start = std::time::Instant::now();
    let result = bus
        .subscribe("never", HashMap::new(), Duration::from_millis(50))
        .await;
    let elapsed = start.elapsed();
    assert_eq!(result.unwrap_err(), EventBusError::Timeout);
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(250));
}

#[tokio::test]
async fn timed_out_waiter_is_removed_from_registry() {
    let bus = EventBus::new();
    let _ = bus
        .subscribe("never", HashMap::new(), Duration::from_millis(10))
        .await;
    assert_eq!(bus.waiter_count(), 0);
}

#[tokio::test]
async fn publish_with_no_waiters_is_a_no_op() {
    let bus = EventBus::new();
    bus.publish(event("anything", HashMap::new()));
}

#[tokio::test]
async fn publish_delivers_to_every_matching_waiter() {
    let bus = EventBus::new();
    let filter = HashMap::new();
    let first = bus.subscribe("tool-completed", filter.clone(), Duration::from_millis(200));
    let second = bus.subscribe("tool-completed", filter, Duration::from_millis(200));

    let publish_event = event("tool-completed", HashMap::new());
    let publish_fut = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.publish(publish_event.clone());
    };

    let ((first_result, second_result), ()) = tokio::join!(tokio::join!(first, second), publish_fut);
    assert_eq!(first_result.unwrap(), publish_event);
    assert_eq!(second_result.unwrap(), publish_event);
    assert_eq!(bus.waiter_count(), 0);
}

#[tokio::test]
async fn non_matching_event_type_is_not_delivered() {
    let bus = EventBus::new();
    let subscribe_fut = bus.subscribe("wanted", HashMap::new(), Duration::from_millis(50));
    let publish_fut = async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        bus.publish(event("other", HashMap::new()));
    };
    let (result, ()) = tokio::join!(subscribe_fut, publish_fut);
    assert_eq!(result.unwrap_err(), EventBusError::Timeout);
}
