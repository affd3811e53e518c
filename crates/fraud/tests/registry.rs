use sentinel_fraud::{Error, Proof, ProofType, Registry};
use sentinel_test::MockProof;

#[test]
fn decode_registered_type() {
    let registry = Registry::new();
    registry.register::<MockProof>().unwrap();

    let proof = MockProof::new(true);
    let bytes = proof.encode().unwrap();

    let decoded = registry.decode(&MockProof::TYPE, &bytes).unwrap();

    assert_eq!(decoded.proof_type(), MockProof::TYPE);
    assert_eq!(decoded.height(), proof.height);
    assert_eq!(decoded.header_hash(), b"hash");
    assert_eq!(decoded.encode().unwrap(), bytes);
}

#[test]
fn unknown_type() {
    let registry = Registry::new();

    let result = registry.decode(&ProofType::from_static("badEncoding"), b"{}");
    assert!(matches!(result, Err(Error::UnknownType(_))));
}

#[test]
fn duplicate_registration() {
    let registry = Registry::new();

    registry.register::<MockProof>().unwrap();

    let result = registry.register::<MockProof>();
    assert!(matches!(result, Err(Error::AlreadyRegistered(t)) if t == MockProof::TYPE));

    assert!(!registry.register_if_absent::<MockProof>());
    assert!(registry.is_registered(&MockProof::TYPE));
    assert_eq!(registry.proof_types(), vec![MockProof::TYPE]);
}

#[test]
fn undecodable_bytes() {
    let registry = Registry::new();
    registry.register::<MockProof>().unwrap();

    let result = registry.decode(&MockProof::TYPE, b"not json");
    assert!(matches!(result, Err(Error::Decode(_))));
}
