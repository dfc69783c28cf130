use crate::crypto::{PrivateKey, PublicKey, Signature, Wallet};

#[test]
fn test_key_generation() {
    let private_key = PrivateKey::new_key();
    let public_key = private_key.public_key();

    // Keys should be generated successfully
    assert_ne!(private_key.0.to_bytes().len(), 0);

    // Public key should be derivable from private key
    let public_key2 = private_key.public_key();
    assert_eq!(public_key, public_key2);
}

#[test]
fn test_signature_creation_and_verification() {
    let private_key = PrivateKey::new_key();
    let public_key = private_key.public_key();

    let signature = private_key.sign("test message");

    // Signature should verify correctly
    assert!(signature.verify("test message", &public_key));
}

#[test]
fn test_signature_verification_fails_wrong_message() {
    let private_key = PrivateKey::new_key();
    let public_key = private_key.public_key();

    let signature = private_key.sign("message 1");

    // Signature should NOT verify for different message
    assert!(!signature.verify("message 2", &public_key));
}

#[test]
fn test_signature_verification_fails_wrong_key() {
    let private_key1 = PrivateKey::new_key();
    let private_key2 = PrivateKey::new_key();
    let public_key2 = private_key2.public_key();

    let signature = private_key1.sign("test message");

    // Signature should NOT verify with wrong public key
    assert!(!signature.verify("test message", &public_key2));
}

#[test]
fn test_public_key_hex_round_trip() {
    let private_key = PrivateKey::new_key();
    let public_key = private_key.public_key();

    let decoded = PublicKey::from_hex(&public_key.to_hex()).unwrap();
    assert_eq!(public_key, decoded);
}

#[test]
fn test_signature_hex_round_trip() {
    let private_key = PrivateKey::new_key();
    let signature = private_key.sign("round trip");

    let decoded = Signature::from_hex(&signature.to_hex()).unwrap();
    assert_eq!(signature, decoded);
}

#[test]
fn test_wallet_sign_and_verify() {
    let wallet = Wallet::generate();
    let signature = wallet.sign("hello blockchain");

    assert!(Wallet::verify("hello blockchain", &signature, &wallet.address()));
    assert!(!Wallet::verify("goodbye blockchain", &signature, &wallet.address()));
}

#[test]
fn test_wallet_verify_tolerates_garbage() {
    let wallet = Wallet::generate();
    let signature = wallet.sign("data");

    // Garbage hex must fail verification, not panic
    assert!(!Wallet::verify("data", "not-hex", &wallet.address()));
    assert!(!Wallet::verify("data", &signature, "not-an-address"));
    assert!(!Wallet::verify("data", "abcd", &wallet.address()));
}

#[test]
fn test_wallet_nonce_counter() {
    let mut wallet = Wallet::generate();
    assert_eq!(wallet.current_nonce(), 0);
    assert_eq!(wallet.increment_nonce(), 1);
    assert_eq!(wallet.increment_nonce(), 2);
    assert_eq!(wallet.current_nonce(), 2);
}

#[test]
fn test_wallet_stored_round_trip() {
    let mut wallet = Wallet::generate();
    wallet.increment_nonce();

    let restored = Wallet::from_stored(&wallet.to_stored()).unwrap();
    assert_eq!(restored.address(), wallet.address());
    assert_eq!(restored.current_nonce(), 1);

    // Restored wallet signs for the same address
    let signature = restored.sign("same key");
    assert!(Wallet::verify("same key", &signature, &wallet.address()));
}
