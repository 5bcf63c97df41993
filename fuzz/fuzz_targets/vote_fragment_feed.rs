#![no_main]

use libfuzzer_sys::fuzz_target;
use thread_bot_engine::aggregator::ends_with_closing_marker;
use thread_bot_engine::{
    ChannelId, ChatEvent, Classification, EventClassifier, InboundMessage, MessageId,
    TriggerAggregator, UserId, WatchedChannels,
};

const VOTING: ChannelId = ChannelId(10);

fuzz_target!(|data: &[u8]| {
    let classifier = EventClassifier::new(WatchedChannels {
        nomination_voting: VOTING,
        appeals: None,
    });
    let mut aggregator = TriggerAggregator::new();
    let mut closers = Vec::new();
    let mut completed = Vec::new();

    for (index, chunk) in data.split(|byte| *byte == 0).enumerate() {
        let event = ChatEvent::Message(InboundMessage {
            id: MessageId(index as u64 + 1),
            channel_id: VOTING,
            author_id: UserId(1),
            author_is_bot: true,
            content: String::from_utf8_lossy(chunk).into_owned(),
            embeds: Vec::new(),
            reference: None,
        });
        let Classification::VoteFragment(fragment) = classifier.classify(&event) else {
            panic!("bot message in the voting channel must be a vote fragment");
        };
        if ends_with_closing_marker(&fragment.text) {
            closers.push(fragment.message_id);
        }
        completed.extend(aggregator.feed(&fragment));
    }

    assert!(completed.len() <= closers.len());
    for trigger in &completed {
        assert!(!trigger.subject.trim().is_empty());
        assert_eq!(trigger.channel_id, VOTING);
        assert!(closers.contains(&trigger.origin_message_id));
    }
});
