use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;

use super::amount::{Amount, Balance};
use super::crypto::{self, Address, DigitalSignature, PublicKey, Signer};

/// Sender used by mining reward transactions
pub const SYSTEM_SENDER: &str = "SYSTEM";

/// Errors that can occur when validating a transaction
#[derive(Debug, Error, PartialEq)]
pub enum TransactionError {
    #[error("Invalid signature: {0}")]
    BadSignature(String),

    #[error("Sender and receiver must be different addresses")]
    SelfTransfer,

    #[error("Amount must be strictly positive")]
    NonPositiveAmount,

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Amount, available: Balance },

    #[error("Reward transactions are only created by the miner")]
    ForgedReward,

    #[error("Transaction {0} is already confirmed")]
    AlreadyConfirmed(TransactionId),
}

impl TransactionError {
    /// Stable name of the error kind, reported to API clients
    pub fn kind(&self) -> &'static str {
        match self {
            TransactionError::BadSignature(_) => "BadSignature",
            TransactionError::SelfTransfer => "SelfTransfer",
            TransactionError::NonPositiveAmount => "NonPositiveAmount",
            TransactionError::InsufficientFunds { .. } => "InsufficientFunds",
            TransactionError::ForgedReward => "ForgedReward",
            TransactionError::AlreadyConfirmed(_) => "AlreadyConfirmed",
        }
    }
}

/// Deterministic identity of a transaction: `sender|receiver|amount|signature`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a transfer of coins between two addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address, or `SYSTEM` for mining rewards
    pub sender: Address,

    /// Receiver's address
    pub receiver: Address,

    /// Amount being transferred
    #[schema(value_type = f64, example = 50.0)]
    pub amount: Amount,

    /// Hex encoded 64-byte signature over the receiver and amount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub signature: Option<DigitalSignature>,

    /// Hex encoded public key of the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub public_key: Option<PublicKey>,
}

/// Builds the message a sender signs: the SHA-256 digest of
/// `"{receiver}:{amount}"` with the amount rendered to two decimals.
pub fn signing_message(receiver: &Address, amount: Amount) -> [u8; 32] {
    crypto::hash(format!("{}:{}", receiver, amount).as_bytes())
}

impl Transaction {
    /// Creates a mining reward paying `amount` to `receiver`
    pub fn new_reward(receiver: Address, amount: Amount) -> Self {
        Transaction {
            sender: Address(SYSTEM_SENDER.to_string()),
            receiver,
            amount,
            signature: None,
            public_key: None,
        }
    }

    /// Creates a transaction signed by `signer`; the sender is the signer's address
    pub fn new_signed(signer: &dyn Signer, receiver: Address, amount: Amount) -> Self {
        let public_key = signer.public_key();
        let signature = signer.sign(&signing_message(&receiver, amount));

        Transaction {
            sender: Address::from_public_key(&public_key),
            receiver,
            amount,
            signature: Some(signature),
            public_key: Some(public_key),
        }
    }

    /// Checks if the transaction is a mining reward
    pub fn is_reward(&self) -> bool {
        self.sender.0 == SYSTEM_SENDER
    }

    pub fn id(&self) -> TransactionId {
        let signature = self
            .signature
            .as_ref()
            .map(DigitalSignature::to_hex)
            .unwrap_or_default();

        TransactionId(format!(
            "{}|{}|{}|{}",
            self.sender, self.receiver, self.amount, signature
        ))
    }

    /// Structural checks that need no key material or chain state
    pub fn check_structure(&self) -> Result<(), TransactionError> {
        if self.is_reward() {
            return Err(TransactionError::ForgedReward);
        }
        if self.amount.is_zero() {
            return Err(TransactionError::NonPositiveAmount);
        }
        if self.sender == self.receiver {
            return Err(TransactionError::SelfTransfer);
        }
        Ok(())
    }

    /// Verifies the signature and that the public key belongs to the sender
    pub fn verify_signature(&self) -> Result<(), TransactionError> {
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| TransactionError::BadSignature("missing signature".to_string()))?;
        let public_key = self
            .public_key
            .as_ref()
            .ok_or_else(|| TransactionError::BadSignature("missing public key".to_string()))?;

        let message = signing_message(&self.receiver, self.amount);
        if !crypto::verify(public_key, &message, signature) {
            return Err(TransactionError::BadSignature(
                "signature does not match receiver and amount".to_string(),
            ));
        }

        if Address::from_public_key(public_key) != self.sender {
            return Err(TransactionError::BadSignature(
                "public key does not belong to sender".to_string(),
            ));
        }

        Ok(())
    }

    /// Structural and signature checks; everything short of solvency
    pub fn validate_signed(&self) -> Result<(), TransactionError> {
        self.check_structure()?;
        self.verify_signature()
    }

    /// Checks that a reward is well formed and pays exactly `expected`
    pub fn is_valid_reward(&self, expected: Amount) -> bool {
        self.is_reward()
            && self.amount == expected
            && !self.receiver.0.trim().is_empty()
            && self.receiver.0 != SYSTEM_SENDER
            && self.signature.is_none()
            && self.public_key.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::Wallet;

    #[test]
    fn test_signed_transaction_verifies() {
        let sender = Wallet::generate();
        let receiver = Wallet::generate();

        let transaction =
            Transaction::new_signed(&sender, receiver.address().clone(), Amount::from_whole(10));

        assert_eq!(&transaction.sender, sender.address());
        assert!(transaction.signature.is_some());
        assert_eq!(transaction.validate_signed(), Ok(()));
    }

    #[test]
    fn test_tampered_amount_fails_signature() {
        let sender = Wallet::generate();
        let mut transaction =
            Transaction::new_signed(&sender, Address::from("bob"), Amount::from_whole(10));
        transaction.amount = Amount::from_whole(1000);

        assert!(matches!(
            transaction.verify_signature(),
            Err(TransactionError::BadSignature(_))
        ));
    }

    #[test]
    fn test_sender_must_match_public_key() {
        let sender = Wallet::generate();
        let impostor = Wallet::generate();
        let mut transaction =
            Transaction::new_signed(&sender, Address::from("bob"), Amount::from_whole(10));
        transaction.sender = impostor.address().clone();

        assert!(matches!(
            transaction.verify_signature(),
            Err(TransactionError::BadSignature(_))
        ));
    }

    #[test]
    fn test_missing_signature() {
        let sender = Wallet::generate();
        let mut transaction =
            Transaction::new_signed(&sender, Address::from("bob"), Amount::from_whole(1));
        transaction.signature = None;

        assert!(matches!(
            transaction.validate_signed(),
            Err(TransactionError::BadSignature(_))
        ));
    }

    #[test]
    fn test_structural_errors() {
        let sender = Wallet::generate();

        let zero = Transaction::new_signed(&sender, Address::from("bob"), Amount::default());
        assert_eq!(zero.check_structure(), Err(TransactionError::NonPositiveAmount));

        let to_self =
            Transaction::new_signed(&sender, sender.address().clone(), Amount::from_whole(5));
        assert_eq!(to_self.check_structure(), Err(TransactionError::SelfTransfer));

        let reward = Transaction::new_reward(Address::from("miner"), Amount::from_whole(100));
        assert_eq!(reward.check_structure(), Err(TransactionError::ForgedReward));
    }

    #[test]
    fn test_reward_transaction() {
        let reward = Transaction::new_reward(Address::from("miner"), Amount::from_whole(100));

        assert!(reward.is_reward());
        assert!(reward.is_valid_reward(Amount::from_whole(100)));
        assert!(!reward.is_valid_reward(Amount::from_whole(50)));
        assert_eq!(reward.id().as_str(), "SYSTEM|miner|100.00|");
    }

    #[test]
    fn test_identity_includes_signature() {
        let sender = Wallet::generate();
        let first = Transaction::new_signed(&sender, Address::from("bob"), Amount::from_whole(3));
        let second = first.clone();
        assert_eq!(first.id(), second.id());

        let signature = first.signature.unwrap().to_hex();
        assert!(first.id().as_str().ends_with(&signature));
    }

    #[test]
    fn test_wire_format() {
        let sender = Wallet::generate();
        let transaction =
            Transaction::new_signed(&sender, Address::from("bob"), Amount::from_cents(1250).unwrap());

        let json = serde_json::to_value(&transaction).unwrap();
        assert_eq!(json["amount"], 12.5);
        assert_eq!(json["signature"].as_str().unwrap().len(), 128);

        let decoded: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, transaction);
    }
}
