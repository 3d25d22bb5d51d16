use serde_json::json;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile;
use zf_notary::{
    Certificate, ConfigStore, Document, FileStore, MemoryStore, Notary, NotaryError, PROTOCOL,
    SecurityModule, SecurityState, Signature, StorageKey, Tag, fsutil::config_filename,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

static SALT: &[u8; 16] = b"zf-notary salt!!";

#[derive(Clone, Default)]
struct FailingStore {
    inner: MemoryStore,
    failing: Arc<AtomicBool>,
}

impl FailingStore {
    fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(io::Error::other("write refused"))
        } else {
            Ok(())
        }
    }
}

impl ConfigStore for FailingStore {
    fn exists(&self) -> io::Result<bool> {
        self.inner.exists()
    }

    fn load(&self) -> io::Result<Vec<u8>> {
        self.inner.load()
    }

    fn store(&self, buf: &[u8]) -> io::Result<()> {
        self.check()?;
        self.inner.store(buf)
    }

    fn delete(&self) -> io::Result<()> {
        self.check()?;
        self.inner.delete()
    }
}

#[test]
fn test_end_to_end() {
    init_logging();
    let store = MemoryStore::new();
    let module = SecurityModule::open(store.clone()).unwrap();
    assert_eq!(module.state(), SecurityState::Keyless);
    let notary = Notary::new(vec![(PROTOCOL, module)]).unwrap();

    let c1 = notary.generate_key().unwrap();
    assert_eq!(c1.version.get(), 1);
    assert_eq!(c1.previous, None);
    notary.activate_key(&c1).unwrap();

    let d = Document::new(json!({"title": "deed", "parcel": 42})).unwrap();
    let k1 = notary.notarize_document(&d).unwrap();
    assert_eq!(k1.certificate, c1.citation().unwrap());
    assert!(notary.is_valid(&k1, &c1));

    let before = notary.get_citation().unwrap();
    let c2 = notary.refresh_key().unwrap();
    assert_eq!(c2.previous, Some(before));
    assert!(c2.is_signed_by(&c1.public_key));
    assert!(notary.is_valid(&k1, &c1));

    let k2 = notary.notarize_document(&d).unwrap();
    assert_eq!(k2.certificate, c2.citation().unwrap());
    assert!(notary.is_valid(&k2, &c2));
    assert!(!notary.is_valid(&k2, &c1));

    // Citations
    let citation = notary.cite_document(&d).unwrap();
    assert!(notary.citation_matches(&citation, &d));
    let mut edited = d.clone();
    edited.content = json!({"title": "deed", "parcel": 43});
    assert!(!notary.citation_matches(&citation, &edited));

    // Everything survives a trip through JSON
    let text = serde_json::to_string(&k1).unwrap();
    let k1_again = serde_json::from_str(&text).unwrap();
    assert!(notary.is_valid(&k1_again, &c1));
    let text = serde_json::to_string(&c2).unwrap();
    let c2_again: Certificate = serde_json::from_str(&text).unwrap();
    notary.validate_certificate_chain(&[c1, c2_again]).unwrap();

    notary.forget_key().unwrap();
    assert!(!store.exists().unwrap());
}

#[test]
fn test_certificate_chain() {
    init_logging();
    let tmpdir = tempfile::TempDir::new().unwrap();
    let notary = Notary::open(tmpdir.path()).unwrap();
    let c1 = notary.generate_key().unwrap();
    notary.activate_key(&c1).unwrap();
    let c2 = notary.refresh_key().unwrap();
    let c3 = notary.refresh_key().unwrap();
    let chain = vec![c1.clone(), c2.clone(), c3.clone()];
    notary.validate_certificate_chain(&chain).unwrap();

    for order in [[0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]] {
        let reordered: Vec<Certificate> = order.iter().map(|i| chain[*i].clone()).collect();
        assert!(notary.validate_certificate_chain(&reordered).is_err());
    }

    for i in 0..chain.len() {
        let good = *chain[i].signature.as_bytes();
        for bit in 0..(good.len() * 8) {
            let mut bytes = good;
            bytes[bit / 8] ^= 1 << (bit % 8);
            let mut bad = chain.clone();
            bad[i].signature = Signature::from_bytes(bytes);
            assert!(matches!(
                notary.validate_certificate_chain(&bad),
                Err(NotaryError::Validation(_))
            ));
        }
    }
}

#[test]
fn test_reopen_file_store() {
    init_logging();
    let tmpdir = tempfile::TempDir::new().unwrap();
    let filename = config_filename(tmpdir.path(), PROTOCOL);
    let (account, c1) = {
        let notary = Notary::open(tmpdir.path()).unwrap();
        let c1 = notary.generate_key().unwrap();
        (notary.account().unwrap(), c1)
    };
    assert!(filename.exists());

    let notary = Notary::open(tmpdir.path()).unwrap();
    assert_eq!(notary.account(), Some(account));
    assert!(matches!(
        notary.generate_key(),
        Err(NotaryError::AlreadyKeyed)
    ));
    // The active certificate is not persisted
    assert!(matches!(
        notary.get_citation(),
        Err(NotaryError::NotActivated)
    ));
    notary.activate_key(&c1).unwrap();
    let contract = notary.notarize_document(&Document::new(json!([1, 2, 3])).unwrap()).unwrap();
    assert!(notary.is_valid(&contract, &c1));

    notary.forget_key().unwrap();
    assert!(!filename.exists());
}

#[test]
fn test_reopen_after_refresh() {
    init_logging();
    let tmpdir = tempfile::TempDir::new().unwrap();
    let chain = {
        let notary = Notary::open(tmpdir.path()).unwrap();
        let c1 = notary.generate_key().unwrap();
        notary.activate_key(&c1).unwrap();
        let c2 = notary.refresh_key().unwrap();
        vec![c1, c2]
    };

    let notary = Notary::open(tmpdir.path()).unwrap();
    // A successor can't be trusted on its own
    assert!(matches!(
        notary.activate_key(&chain[1]),
        Err(NotaryError::Validation(_))
    ));
    let mut forged = chain.clone();
    forged[1].signature = Signature::from_bytes([0; 64]);
    assert!(notary.activate_chain(&forged).is_err());
    assert!(matches!(
        notary.get_citation(),
        Err(NotaryError::NotActivated)
    ));

    notary.activate_chain(&chain).unwrap();
    let contract = notary.notarize_document(&Document::new(json!("hi")).unwrap()).unwrap();
    assert!(notary.is_valid(&contract, &chain[1]));
    assert_eq!(contract.certificate, chain[1].citation().unwrap());
}

#[test]
fn test_reopen_mid_rotation() {
    init_logging();
    let tmpdir = tempfile::TempDir::new().unwrap();
    let (c1, new_key) = {
        let notary = Notary::open(tmpdir.path()).unwrap();
        let c1 = notary.generate_key().unwrap();
        notary.activate_key(&c1).unwrap();
        // Crash after the rotation persisted but before the chain signature
        let module = notary.security_module(PROTOCOL).unwrap();
        (c1, module.rotate_keys().unwrap())
    };

    let notary = Notary::open(tmpdir.path()).unwrap();
    let module = notary.security_module(PROTOCOL).unwrap();
    assert_eq!(module.state(), SecurityState::TwoKeys);
    assert_eq!(module.public_key(), Some(new_key));
    notary.activate_key(&c1).unwrap();
    assert!(matches!(
        notary.notarize_document(&Document::new(json!(null)).unwrap()),
        Err(NotaryError::RotationPending)
    ));

    let c2 = notary.refresh_key().unwrap();
    assert_eq!(c2.public_key, new_key);
    notary.validate_certificate_chain(&[c1, c2]).unwrap();
    assert_eq!(module.state(), SecurityState::LoneKey);
}

#[test]
fn test_sealed_notary() {
    init_logging();
    let tmpdir = tempfile::TempDir::new().unwrap();
    let key = StorageKey::from_passphrase(b"open sesame", SALT).unwrap();
    let account = {
        let notary = Notary::open_sealed(tmpdir.path(), key.clone()).unwrap();
        notary.generate_key().unwrap();
        notary.account().unwrap()
    };

    let raw = std::fs::read(config_filename(tmpdir.path(), PROTOCOL)).unwrap();
    assert!(!raw.windows(7).any(|w| w == b"LoneKey"));
    assert!(!raw.windows(11).any(|w| w == b"private_key"));

    let wrong = StorageKey::from_passphrase(b"open sesame!", SALT).unwrap();
    assert!(matches!(
        Notary::open_sealed(tmpdir.path(), wrong),
        Err(NotaryError::Persistence(_))
    ));
    assert!(matches!(
        Notary::open(tmpdir.path()),
        Err(NotaryError::Construction(_))
    ));

    let notary = Notary::open_sealed(tmpdir.path(), key).unwrap();
    assert_eq!(notary.account(), Some(account));
}

#[test]
fn test_rollback_on_failed_write() {
    init_logging();
    let store = FailingStore::default();
    let module = SecurityModule::open(store.clone()).unwrap();
    let first = module.generate_keys().unwrap();
    let persisted = store.load().unwrap();

    store.fail(true);
    assert!(matches!(
        module.rotate_keys(),
        Err(NotaryError::Persistence(_))
    ));
    assert_eq!(module.state(), SecurityState::LoneKey);
    assert_eq!(module.public_key(), Some(first));
    assert_eq!(store.load().unwrap(), persisted);

    // Erase still wipes memory, then reports the failed delete
    assert!(matches!(
        module.erase_keys(),
        Err(NotaryError::Persistence(_))
    ));
    assert_eq!(module.state(), SecurityState::Keyless);
    assert_eq!(module.public_key(), None);
    assert!(store.exists().unwrap());

    store.fail(false);
    module.erase_keys().unwrap();
    assert!(!store.exists().unwrap());
}

#[test]
fn test_file_store_security_module() {
    let tmpdir = tempfile::TempDir::new().unwrap();
    let filename = tmpdir.path().join("module.config");
    let module = SecurityModule::open(FileStore::new(&filename)).unwrap();
    let public = module.generate_keys().unwrap();
    let sig = module.sign_bytes(b"hello").unwrap();
    assert!(module.is_valid(&public, &sig, b"hello"));
    drop(module);

    let module = SecurityModule::open(FileStore::new(&filename)).unwrap();
    assert_eq!(module.public_key(), Some(public));
    module.erase_keys().unwrap();
    assert!(!filename.exists());
    assert!(module.sign_bytes(b"hello").unwrap_err().is_not_keyed());
}

#[test]
fn test_concurrent_notarization() {
    init_logging();
    let notary = Arc::new(Notary::new(vec![(
        PROTOCOL,
        SecurityModule::open(MemoryStore::new()).unwrap(),
    )])
    .unwrap());
    let c1 = notary.generate_key().unwrap();
    notary.activate_key(&c1).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let notary = Arc::clone(&notary);
            std::thread::spawn(move || {
                (0..8)
                    .map(|j| {
                        let doc = Document::new(json!({"thread": i, "n": j})).unwrap();
                        notary.notarize_document(&doc).unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let c2 = notary.refresh_key().unwrap();
    for handle in handles {
        for contract in handle.join().unwrap() {
            let cert = if contract.certificate == c1.citation().unwrap() {
                &c1
            } else {
                &c2
            };
            assert!(notary.is_valid(&contract, cert));
        }
    }
}

#[test]
fn test_credentials_handshake() {
    let notary = Notary::new(vec![(
        PROTOCOL,
        SecurityModule::open(MemoryStore::new()).unwrap(),
    )])
    .unwrap();
    let cert = notary.generate_key().unwrap();
    notary.activate_key(&cert).unwrap();

    // The relying party issues a challenge, the notary answers with credentials
    let challenge = Tag::generate().unwrap();
    let creds = notary.generate_credentials(challenge).unwrap();
    notary
        .validate_credentials(&creds, &cert, &challenge)
        .unwrap();
    let replayed = Tag::generate().unwrap();
    assert!(notary.validate_credentials(&creds, &cert, &replayed).is_err());
}
