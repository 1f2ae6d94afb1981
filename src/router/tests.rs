/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::sync::atomic::AtomicUsize;
use std::thread;

use super::*;
use crate::Close;
use crate::Message;
use crate::Payload;
use crate::testing::REPLY_TIMEOUT;
use crate::testing::RecordingSink;
use crate::testing::Responder;
use crate::testing::jid;
use crate::testing::link;

const LOCAL: &str = "juliet@capulet.lit/balcony";
const PEER: &str = "romeo@montague.lit/orchard";
const STRANGER: &str = "tybalt@capulet.lit/street";

fn close_request(session_id: &str) -> Iq {
    Iq::set(
        &jid(PEER),
        Payload::Close(Close {
            session_id: session_id.to_string(),
        }),
    )
}

fn incoming_set(id: &str) -> Iq {
    let mut iq = close_request("sid");
    iq.id = id.to_string();
    iq.to = Some(jid(LOCAL));
    iq
}

#[test]
fn ids_are_assigned() {
    let (router, sink) = RecordingSink::connect(LOCAL, PEER, Responder::Silent);
    router.send(Message::new(&jid(PEER))).unwrap();
    router.send(Message::new(&jid(PEER))).unwrap();
    let sent = sink.sent();
    assert_eq!(sent.len(), 2);
    assert!(!sent[0].id().is_empty());
    assert_ne!(sent[0].id(), sent[1].id());
}

#[test]
fn reply_is_correlated() {
    let (router, sink) = RecordingSink::connect(LOCAL, PEER, Responder::Acknowledge);
    let reply = router.send_iq_and_wait(close_request("a")).unwrap();
    let request = sink.sent().pop().unwrap();
    assert_eq!(reply.iq_type, IqType::Result);
    assert_eq!(reply.id, request.id());
    assert_eq!(reply.from, Some(jid(PEER)));
}

#[test]
fn error_reply_is_surfaced() {
    let (router, _sink) = RecordingSink::connect(
        LOCAL,
        PEER,
        Responder::Fail(ErrorCondition::ItemNotFound),
    );
    let err = router.send_iq_and_wait(close_request("a")).unwrap_err();
    assert_eq!(
        err.stanza_error().map(|err| err.condition),
        Some(ErrorCondition::ItemNotFound)
    );
}

#[test]
fn missing_reply_times_out() {
    let (router, sink) = RecordingSink::connect(LOCAL, PEER, Responder::Silent);
    assert_eq!(
        router.send_iq_and_wait(close_request("a")),
        Err(ConnectionError::NoResponse(REPLY_TIMEOUT))
    );
    // a late reply is dropped without harm
    sink.set_responder(Responder::Acknowledge);
    let late = sink.sent().pop().unwrap();
    sink.inject(Iq::result_for(late.as_iq().unwrap()));
    assert!(router.send_iq_and_wait(close_request("b")).is_ok());
}

#[test]
fn reply_from_another_thread() {
    let (router, sink) = RecordingSink::connect(LOCAL, PEER, Responder::Silent);
    let answering = sink.clone();
    let answer = thread::spawn(move || {
        for _ in 0..100 {
            if let Some(Stanza::Iq(request)) = answering.sent().pop() {
                answering.inject(Iq::result_for(&request));
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
    });
    assert!(router.send_iq_and_wait(close_request("a")).is_ok());
    answer.join().unwrap();
}

#[test]
fn replies_must_come_from_the_addressee() {
    let (router, sink) = RecordingSink::connect(LOCAL, PEER, Responder::Silent);
    let answering = sink.clone();
    let delivering = router.clone();
    let answer = thread::spawn(move || {
        for _ in 0..100 {
            if let Some(Stanza::Iq(request)) = answering.sent().pop() {
                let mut forged = Iq::result_for(&request);
                forged.from = Some(jid(STRANGER));
                delivering.deliver(forged.into());
                answering.inject(Iq::result_for(&request));
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
    });
    let reply = router.send_iq_and_wait(close_request("a")).unwrap();
    answer.join().unwrap();
    assert_eq!(reply.from, Some(jid(PEER)));
}

#[test]
fn reply_senders() {
    let local = jid(LOCAL);
    let to_peer = PendingReply::new(Some(jid(PEER)));
    assert!(to_peer.answered_by(&local, Some(&jid(PEER))));
    assert!(!to_peer.answered_by(&local, Some(&jid(STRANGER))));
    assert!(!to_peer.answered_by(&local, Some(&jid("romeo@montague.lit/garden"))));
    assert!(!to_peer.answered_by(&local, None));

    let to_bare = PendingReply::new(Some(jid("romeo@montague.lit")));
    assert!(to_bare.answered_by(&local, Some(&jid(PEER))));
    assert!(!to_bare.answered_by(&local, Some(&jid("montague.lit"))));

    let to_server = PendingReply::new(None);
    assert!(to_server.answered_by(&local, None));
    assert!(to_server.answered_by(&local, Some(&jid("capulet.lit"))));
    assert!(to_server.answered_by(&local, Some(&jid("juliet@capulet.lit"))));
    assert!(!to_server.answered_by(&local, Some(&jid(PEER))));

    let to_account = PendingReply::new(Some(jid("juliet@capulet.lit")));
    assert!(to_account.answered_by(&local, None));
}

#[test]
fn handlers_follow_filters() {
    let (router, sink) = RecordingSink::connect(LOCAL, PEER, Responder::Silent);
    let sets = Arc::new(AtomicUsize::new(0));
    let messages = Arc::new(AtomicUsize::new(0));
    let counter = sets.clone();
    router.register(
        StanzaFilter::iq(IqType::Set).matching(|stanza| {
            stanza
                .payloads()
                .iter()
                .any(|payload| payload.as_close().is_some())
        }),
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );
    let counter = messages.clone();
    let id = router.register(StanzaFilter::message(), move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    sink.inject(incoming_set("one"));
    sink.inject(Message::new(&jid(LOCAL)));
    assert_eq!(sets.load(Ordering::SeqCst), 1);
    assert_eq!(messages.load(Ordering::SeqCst), 1);

    router.unregister(id);
    sink.inject(Message::new(&jid(LOCAL)));
    assert_eq!(messages.load(Ordering::SeqCst), 1);
    // messages are never answered
    assert!(sink.sent().is_empty());
}

#[test]
fn combined_predicates() {
    let filter = StanzaFilter::iq(IqType::Set)
        .matching(|stanza| stanza.id().starts_with('a'))
        .matching(|stanza| stanza.id().ends_with('z'));
    assert!(filter.accepts(&incoming_set("abcz").into()));
    assert!(!filter.accepts(&incoming_set("abc").into()));
    assert!(!filter.accepts(&incoming_set("bcz").into()));
    assert!(!StanzaFilter::iq(IqType::Get).accepts(&incoming_set("az").into()));
    assert!(!filter.accepts(&Message::new(&jid(LOCAL)).into()));
}

#[test]
fn unclaimed_request_is_refused() {
    let (_router, sink) = RecordingSink::connect(LOCAL, PEER, Responder::Silent);
    sink.inject(incoming_set("lost"));
    let reply = match sink.sent().pop() {
        Some(Stanza::Iq(iq)) => iq,
        other => panic!("expected an IQ, got {other:?}"),
    };
    assert_eq!(reply.id, "lost");
    assert_eq!(reply.iq_type, IqType::Error);
    assert_eq!(reply.to, Some(jid(PEER)));
    assert_eq!(
        reply.error.unwrap().condition,
        ErrorCondition::ServiceUnavailable
    );
}

#[test]
fn shutdown_fails_waiting_requests() {
    let (router, _sink) = RecordingSink::connect(LOCAL, PEER, Responder::Silent);
    let closed = Arc::new(AtomicBool::new(false));
    let flag = closed.clone();
    router.on_close(move || flag.store(true, Ordering::SeqCst));

    let waiting = router.clone();
    let waiter = thread::spawn(move || waiting.send_iq_and_wait(close_request("a")));
    thread::sleep(Duration::from_millis(50));
    router.shutdown();
    assert_eq!(waiter.join().unwrap(), Err(ConnectionError::NotConnected));
    assert!(closed.load(Ordering::SeqCst));
    assert!(!router.is_connected());
    assert_eq!(
        router.send(Message::new(&jid(PEER))),
        Err(ConnectionError::NotConnected)
    );

    let late = Arc::new(AtomicBool::new(false));
    let flag = late.clone();
    router.on_close(move || flag.store(true, Ordering::SeqCst));
    assert!(late.load(Ordering::SeqCst));
}

#[test]
fn linked_routers_exchange_replies() {
    let link = link(LOCAL, PEER);
    let reply = link
        .a
        .send_iq_and_wait(close_request("linked"))
        .unwrap_err();
    // nothing handles close requests on the other side yet
    assert_eq!(
        reply.stanza_error().map(|err| err.condition),
        Some(ErrorCondition::ServiceUnavailable)
    );
    assert_eq!(link.b_to_a.replies(IqType::Error).len(), 1);
    assert_eq!(link.a_to_b.sent()[0].sender(), Some(&jid(LOCAL)));
}
