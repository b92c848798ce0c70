use super::*;
use directory::fixtures::sample_lawyers;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

struct EchoReplies;

impl ReplyGenerator for EchoReplies {
    fn greeting(&self, lawyer: &Lawyer) -> String {
        format!("hi from {}", lawyer.id.0)
    }

    fn reply(&self, client_message: &str) -> String {
        format!("re: {client_message}")
    }
}

fn open_room() -> ConsultationRoom {
    let lawyer = sample_lawyers().remove(0);
    ConsultationRoom::open(lawyer, FlowTimings::default(), Arc::new(EchoReplies))
}

async fn connected_room() -> ConsultationRoom {
    let room = open_room();
    tokio::time::sleep(room.timings.connect_delay + Duration::from_millis(1)).await;
    assert_eq!(room.state().await, RoomState::Connected);
    room
}

fn drain(rx: &mut broadcast::Receiver<RoomEvent>) -> Vec<RoomEvent> {
    let mut seen = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => seen.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return seen,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn connects_after_delay_and_greets() {
    let room = open_room();
    let mut rx = room.subscribe();
    assert_eq!(room.state().await, RoomState::Connecting);
    assert_eq!(room.send("hello").await, Err(RoomError::NotConnected));

    tokio::time::sleep(Duration::from_millis(2001)).await;

    assert_eq!(room.state().await, RoomState::Connected);
    let transcript = room.transcript().await;
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].speaker, Speaker::Lawyer);
    assert_eq!(transcript[0].body, "hi from 1");

    let events = drain(&mut rx);
    assert_eq!(events[0], RoomEvent::StateChanged(RoomState::Connected));
    assert!(matches!(&events[1], RoomEvent::Message(m) if m.body == "hi from 1"));
}

#[tokio::test(start_paused = true)]
async fn client_message_appends_now_and_reply_follows() {
    let room = connected_room().await;

    let sent = room.send("  我被公司辞退了  ").await.expect("send");
    assert_eq!(sent.body, "我被公司辞退了");
    assert_eq!(room.transcript().await.len(), 2);

    tokio::time::sleep(room.timings.reply_delay_max + Duration::from_millis(1)).await;
    let transcript = room.transcript().await;
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[2].speaker, Speaker::Lawyer);
    assert_eq!(transcript[2].body, "re: 我被公司辞退了");
}

#[tokio::test(start_paused = true)]
async fn empty_message_is_rejected() {
    let room = connected_room().await;
    assert_eq!(room.send("   ").await, Err(RoomError::EmptyMessage));
    assert_eq!(room.transcript().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn ending_drops_pending_replies_and_navigates_home() {
    let room = connected_room().await;
    let mut rx = room.subscribe();
    room.send("question").await.expect("send");
    room.end().await.expect("end");

    assert_eq!(room.state().await, RoomState::Ended);
    assert_eq!(room.send("late").await, Err(RoomError::Ended));
    assert_eq!(room.end().await, Err(RoomError::Ended));

    tokio::time::sleep(Duration::from_secs(5)).await;
    let transcript = room.transcript().await;
    assert!(transcript.iter().all(|m| !m.body.starts_with("re:")));
    assert_eq!(transcript.last().map(|m| m.speaker), Some(Speaker::System));

    let events = drain(&mut rx);
    assert!(events.contains(&RoomEvent::StateChanged(RoomState::Ended)));
    assert_eq!(events.last(), Some(&RoomEvent::Navigate(Navigation::Home)));
}

#[tokio::test(start_paused = true)]
async fn dropping_room_cancels_connect_timer() {
    let room = open_room();
    let mut rx = room.subscribe();
    drop(room);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(matches!(
        rx.recv().await,
        Err(broadcast::error::RecvError::Closed)
    ));
}

#[test]
fn canned_replies_cycle() {
    let replies = CannedReplies::new(vec!["a".into(), "b".into()]);
    assert_eq!(replies.reply("x"), "a");
    assert_eq!(replies.reply("y"), "b");
    assert_eq!(replies.reply("z"), "a");
    assert_eq!(CannedReplies::new(Vec::new()).reply("x"), "Noted.");
}
