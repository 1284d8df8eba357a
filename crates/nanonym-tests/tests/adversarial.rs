//! Adversarial tests: malformed addresses and notifications, forged
//! payments and misdirected announcements.

use nanonym_core::account::{decode_account, encode_account};
use nanonym_core::address::is_nanonym;
use nanonym_core::error::{CryptoError, NotificationError};
use nanonym_core::stealth::StealthPayment;
use nanonym_core::{NanoNymAddress, PaymentNotification, Raw};
use nanonym_tests::helpers::*;
use nanonym_wallet::{InboundMessage, ManagerEvent, PseudonymStore, WalletError};
use proptest::prelude::*;

fn notification_json(r: &str, tx: &str) -> String {
    format!(r#"{{"version":1,"protocol":"nanonym","R":"{r}","tx_hash":"{tx}"}}"#)
}

// ======================================================================
// Decoders never panic
// ======================================================================

proptest! {
    #[test]
    fn nanonym_decode_arbitrary_input(s in "\\PC{0,200}") {
        let _ = NanoNymAddress::decode(&s);
        let _ = is_nanonym(&s);
    }

    #[test]
    fn nanonym_decode_alphabet_noise(body in "[13456789abcdefghijkmnopqrstuwxyz]{0,180}") {
        let _ = NanoNymAddress::decode(&format!("nnym_{body}"));
    }

    #[test]
    fn account_decode_arbitrary_input(body in "[13456789abcdefghijkmnopqrstuwxyz]{0,70}") {
        let _ = decode_account(&format!("nano_{body}"));
    }

    #[test]
    fn notification_parse_arbitrary_input(s in "\\PC{0,300}") {
        let _ = PaymentNotification::from_json(&s);
    }

    #[test]
    fn single_character_corruption_is_detected(seed_byte in 1u8..=255, pos in 5usize..160, c in "[13456789abcdefghijkmnopqrstuwxyz]") {
        let keys = nanonym_core::derive(&test_seed(seed_byte), 0).unwrap();
        let encoded = NanoNymAddress::from_keys(&keys).encode();
        let pos = pos.min(encoded.len() - 1);
        let mut chars: Vec<char> = encoded.chars().collect();
        let replacement = c.chars().next().unwrap();
        prop_assume!(chars[pos] != replacement);
        chars[pos] = replacement;
        let corrupted: String = chars.into_iter().collect();
        prop_assert!(NanoNymAddress::decode(&corrupted).is_err());
    }
}

#[test]
fn adversarial_truncated_and_extended_addresses() {
    let keys = nanonym_core::derive(&test_seed(9), 0).unwrap();
    let encoded = NanoNymAddress::from_keys(&keys).encode();
    assert!(NanoNymAddress::decode(&encoded[..encoded.len() - 1]).is_err());
    assert!(NanoNymAddress::decode(&format!("{encoded}1")).is_err());
    assert!(NanoNymAddress::decode(&encoded.replacen("nnym_", "nano_", 1)).is_err());

    let account = encode_account(&[7u8; 32]);
    assert!(NanoNymAddress::decode(&account).is_err());
}

// ======================================================================
// Malformed notifications
// ======================================================================

#[tokio::test]
async fn adversarial_notification_wrong_protocol() {
    let w = test_wallet(1);
    let p = w.manager.create_pseudonym("shop").await.unwrap();
    let payment = StealthPayment::new(&p.address).unwrap();
    let mut notification =
        PaymentNotification::build(&payment.ephemeral_public(), "AB".repeat(32), None, None);
    notification.protocol = "monero".into();

    assert_eq!(
        w.manager.process_notification(p.index, &notification).await,
        Err(WalletError::Notification(NotificationError::UnknownProtocol("monero".into())))
    );
    notification.protocol = "nanonym".into();
    notification.version = 2;
    assert_eq!(
        w.manager.process_notification(p.index, &notification).await,
        Err(WalletError::Notification(NotificationError::UnsupportedVersion(2)))
    );
    assert_eq!(w.manager.pseudonym(p.index).unwrap().payment_count(), 0);
}

#[tokio::test]
async fn adversarial_notification_bad_ephemeral_hex() {
    let w = test_wallet(2);
    let p = w.manager.create_pseudonym("shop").await.unwrap();
    let message = InboundMessage {
        recipient_notify: p.keys.notify.public_key(),
        payload: notification_json("zz-not-hex", "ABCD"),
    };
    assert!(matches!(
        w.manager.handle_inbound(message).await,
        Err(WalletError::Notification(NotificationError::InvalidEphemeralKey(_)))
    ));

    let message = InboundMessage {
        recipient_notify: p.keys.notify.public_key(),
        payload: notification_json(&"ab".repeat(16), "ABCD"),
    };
    assert!(matches!(
        w.manager.handle_inbound(message).await,
        Err(WalletError::Notification(NotificationError::InvalidEphemeralKey(_)))
    ));
}

#[tokio::test]
async fn adversarial_notification_missing_tx_reference() {
    let w = test_wallet(3);
    let p = w.manager.create_pseudonym("shop").await.unwrap();
    let payment = StealthPayment::new(&p.address).unwrap();
    let message = InboundMessage {
        recipient_notify: p.keys.notify.public_key(),
        payload: notification_json(&hex::encode(payment.ephemeral_public()), "  "),
    };
    assert_eq!(
        w.manager.handle_inbound(message).await,
        Err(WalletError::Notification(NotificationError::MissingTxReference))
    );
}

#[tokio::test]
async fn adversarial_garbage_payload() {
    let w = test_wallet(3);
    let p = w.manager.create_pseudonym("shop").await.unwrap();
    let message = InboundMessage {
        recipient_notify: p.keys.notify.public_key(),
        payload: "{\"version\":1".into(),
    };
    assert!(matches!(
        w.manager.handle_inbound(message).await,
        Err(WalletError::Notification(NotificationError::Malformed(_)))
    ));
}

#[tokio::test]
async fn adversarial_small_order_ephemeral_key() {
    let w = test_wallet(4);
    let p = w.manager.create_pseudonym("shop").await.unwrap();

    // Compressed identity point.
    let mut identity = [0u8; 32];
    identity[0] = 1;
    let notification = PaymentNotification::build(&identity, "AB".repeat(32), Some(Raw(1)), None);

    assert_eq!(
        w.manager.process_notification(p.index, &notification).await,
        Err(WalletError::Crypto(CryptoError::InvalidPoint))
    );
    assert_eq!(w.manager.pseudonym(p.index).unwrap().payment_count(), 0);
}

#[tokio::test]
async fn adversarial_unrouted_message_is_dropped() {
    let w = test_wallet(5);
    w.manager.create_pseudonym("shop").await.unwrap();
    let message = InboundMessage {
        recipient_notify: [9u8; 32],
        payload: "not even json".into(),
    };
    assert_eq!(w.manager.handle_inbound(message).await, Ok(None));
}

// ======================================================================
// Forged and misdirected payments
// ======================================================================

#[tokio::test]
async fn adversarial_unpaid_notification_fails_to_open() {
    let w = test_wallet(6);
    let p = w.manager.create_pseudonym("shop").await.unwrap();
    let mut events = w.manager.subscribe_events();

    // Announce a payment that was never made.
    let payment = StealthPayment::new(&p.address).unwrap();
    let notification = PaymentNotification::build(
        &payment.ephemeral_public(),
        "CD".repeat(32),
        Some(Raw::xno(1000).unwrap()),
        None,
    );
    w.manager.process_notification(p.index, &notification).await.unwrap();

    let event = wait_for_event(&mut events, |e| matches!(e, ManagerEvent::OpenFailed { .. })).await;
    match event {
        ManagerEvent::OpenFailed { address, .. } => assert_eq!(address, payment.address()),
        other => panic!("unexpected event {other:?}"),
    }
    let account = w.manager.account(p.index, payment.address()).unwrap();
    assert!(!account.is_opened());
    assert!(!w.manager.is_open_pending(payment.address()));
    assert_eq!(w.ledger.receive_count(), 0);
}

#[tokio::test]
async fn adversarial_inflated_claim_is_not_spendable() {
    let w = test_wallet(7);
    let p = w.manager.create_pseudonym("shop").await.unwrap();
    let payment = StealthPayment::new(&p.address).unwrap();
    let tx = w.ledger.pay(payment.address(), Raw::xno(1).unwrap());
    let notification = PaymentNotification::build(
        &payment.ephemeral_public(),
        tx,
        Some(Raw::xno(500).unwrap()),
        None,
    );
    w.manager.process_notification(p.index, &notification).await.unwrap();

    // Opening credits what the ledger says, not what the sender claimed.
    let account = w.manager.account(p.index, payment.address()).unwrap();
    assert!(account.is_opened());
    assert_eq!(account.balance, Raw::xno(1).unwrap());
    assert_eq!(w.manager.pseudonym(p.index).unwrap().balance(), Raw::xno(1).unwrap());
    assert_eq!(w.store.load_all().await.unwrap()[0].balance(), Raw::xno(1).unwrap());

    assert!(matches!(
        w.manager
            .prepare_send(p.index, &encode_account(&[1u8; 32]), Raw::xno(2).unwrap())
            .await,
        Err(WalletError::InsufficientFunds { .. })
    ));
    assert_eq!(w.ledger.balance(payment.address()), Some(Raw::xno(1).unwrap()));
}

#[tokio::test]
async fn adversarial_notification_for_other_recipient() {
    let alice = test_wallet(8);
    let bob = test_wallet(9);
    let alice_p = alice.manager.create_pseudonym("a").await.unwrap();
    let bob_p = bob.manager.create_pseudonym("b").await.unwrap();

    // A payment to Alice announced to Bob derives an account Bob does not
    // own on the ledger, so nothing is credited to him.
    let payment = StealthPayment::new(&alice_p.address).unwrap();
    let tx = bob.ledger.pay(payment.address(), Raw::xno(1).unwrap());
    let notification = PaymentNotification::build(&payment.ephemeral_public(), tx, None, None);

    let mut events = bob.manager.subscribe_events();
    bob.manager.process_notification(bob_p.index, &notification).await.unwrap();
    let bob_account = &bob.manager.pseudonym(bob_p.index).unwrap().stealth_accounts[0];
    assert_ne!(bob_account.address, payment.address());
    assert_ne!(bob_account.public_key, payment.stealth.public_key);

    wait_for_event(&mut events, |e| matches!(e, ManagerEvent::OpenFailed { .. })).await;
    assert_eq!(bob.ledger.balance(payment.address()), None);
}

#[tokio::test]
async fn adversarial_payments_are_unlinkable() {
    let w = test_wallet(10);
    let p = w.manager.create_pseudonym("shop").await.unwrap();
    let first = StealthPayment::new(&p.address).unwrap();
    let second = StealthPayment::new(&p.address).unwrap();

    assert_ne!(first.address(), second.address());
    assert_ne!(first.ephemeral_public(), second.ephemeral_public());
    assert_ne!(first.address(), p.fallback_address);
    assert_ne!(second.address(), p.fallback_address);
}
