//! Property tests for the encrypted vault.

use std::sync::Arc;

use proptest::prelude::*;

use multichain_wallet_core::security::secret_store::SqliteSecretStore;
use multichain_wallet_core::{SecureVault, SessionKey};

fn roundtrip(plaintext: &[u8]) -> Vec<u8> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(async {
        let store = SqliteSecretStore::connect("sqlite::memory:").await.unwrap();
        let vault = SecureVault::new(Arc::new(store), None);
        let session = SessionKey::generate();
        vault.store("entry", plaintext, &session).await.unwrap();
        vault.load("entry", &session).await.unwrap().unwrap().to_vec()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn arbitrary_bytes_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        prop_assert_eq!(roundtrip(&data), data);
    }

    // covers the strings a seed phrase or PIN actually is, including empty
    #[test]
    fn printable_strings_roundtrip(s in "[ -~]{0,128}") {
        prop_assert_eq!(roundtrip(s.as_bytes()), s.as_bytes().to_vec());
    }
}
