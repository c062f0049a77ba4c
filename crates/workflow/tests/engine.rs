//! Workflow engine tests against an in-memory store

use std::sync::Arc;

use tradeflow_core::{
    Action, Actor, Currency, DocType, DocumentStatus, NewUser, Role, TransactionStatus,
};
use tradeflow_ledger::{verify_chain, LedgerAction, LedgerEntry, LedgerQuery};
use tradeflow_store::{LockManager, Store};
use tradeflow_workflow::{
    ActionRequest, OrderTerms, Target, Upload, WorkflowEngine, WorkflowError, WorkflowPolicy,
};

struct World {
    engine: Arc<WorkflowEngine>,
    buyer: Actor,
    seller: Actor,
    bank: Actor,
    auditor: Actor,
}

fn register(store: &Store, name: &str, role: Role, org: &str) -> Actor {
    let user = store
        .read(|repo| {
            repo.insert_user(&NewUser {
                name: name.to_string(),
                email: format!("{}@example.test", name.to_lowercase()),
                org: org.to_string(),
                role,
            })
        })
        .unwrap();
    Actor::from_user(&user)
}

fn world_with(policy: WorkflowPolicy) -> World {
    let store = Store::in_memory().unwrap();
    let buyer = register(&store, "Asha", Role::Buyer, "Acme");
    let seller = register(&store, "Bo", Role::Seller, "Globex");
    let bank = register(&store, "Cy", Role::Bank, "First Bank");
    let auditor = register(&store, "Dee", Role::Auditor, "Audit Co");

    World {
        engine: Arc::new(WorkflowEngine::new(store, LockManager::new(), policy)),
        buyer,
        seller,
        bank,
        auditor,
    }
}

fn world() -> World {
    world_with(WorkflowPolicy::default())
}

/// Upload whose hash is one repeated hex digit
fn file(digit: char) -> Upload {
    Upload::new(digit.to_string().repeat(64), format!("blobs/{}", digit))
}

fn terms(seller: &Actor, amount: &str) -> OrderTerms {
    OrderTerms {
        seller_id: seller.user_id,
        amount: amount.parse().unwrap(),
        currency: Currency::Usd,
    }
}

fn ledger(w: &World) -> Vec<LedgerEntry> {
    w.engine
        .store()
        .read(|repo| repo.ledger(&LedgerQuery::new()))
        .unwrap()
}

/// PO id and transaction id of a fresh order
async fn create_po(w: &World) -> (i64, i64) {
    let applied = w
        .engine
        .create_po(&w.buyer, terms(&w.seller, "1000"), file('a'))
        .await
        .unwrap();
    (applied.document.id, applied.transaction.id)
}

/// Walk an order up to RECEIVE with LOC and BOL issued
async fn received(w: &World) -> (i64, i64) {
    let (po, txn) = create_po(w).await;
    w.engine.issue_loc(&w.bank, po, file('b')).await.unwrap();
    w.engine.upload_bol(&w.seller, po, file('c'), None).await.unwrap();
    w.engine.ship(&w.seller, po).await.unwrap();
    w.engine.receive(&w.buyer, po).await.unwrap();
    (po, txn)
}

#[tokio::test]
async fn test_create_po_opens_pending_transaction() {
    let w = world();
    let applied = w
        .engine
        .create_po(&w.buyer, terms(&w.seller, "1000"), file('a'))
        .await
        .unwrap();

    assert!(applied.created);
    assert_eq!(applied.document.doc_type, DocType::Po);
    assert_eq!(applied.document.status, DocumentStatus::Created);
    assert_eq!(applied.document.doc_number, "PO-000001");
    assert_eq!(applied.transaction.status, TransactionStatus::Pending);
    assert_eq!(applied.transaction.amount, "1000".parse().unwrap());

    let entries = ledger(&w);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, applied.ledger_entry_id);
    assert_eq!(entries[0].action, LedgerAction::CreatePo);
    assert_eq!(entries[0].actor_id, w.buyer.user_id);
    assert_eq!(entries[0].extra_data["po_id"], serde_json::json!(applied.document.id));
}

#[tokio::test]
async fn test_create_po_checks_terms() {
    let w = world();

    let not_seller = w.engine.create_po(&w.buyer, terms(&w.bank, "10"), file('a')).await;
    assert!(matches!(not_seller, Err(WorkflowError::InvalidRequest(_))));

    let zero = w.engine.create_po(&w.buyer, terms(&w.seller, "0"), file('a')).await;
    assert!(matches!(zero, Err(WorkflowError::InvalidRequest(_))));

    let mut unknown = terms(&w.seller, "10");
    unknown.seller_id = 999;
    let unknown = w.engine.create_po(&w.buyer, unknown, file('a')).await;
    assert!(matches!(unknown, Err(WorkflowError::NotFound { entity: "user", .. })));

    let by_seller = w.engine.create_po(&w.seller, terms(&w.seller, "10"), file('a')).await;
    assert!(matches!(by_seller, Err(WorkflowError::Unauthorized(_))));

    assert!(ledger(&w).is_empty());
}

#[tokio::test]
async fn test_single_loc_per_po() {
    let w = world();
    let (po, _) = create_po(&w).await;

    let loc = w.engine.issue_loc(&w.bank, po, file('b')).await.unwrap();
    assert_eq!(loc.document.doc_type, DocType::Loc);
    assert_eq!(loc.transaction.status, TransactionStatus::Pending);

    let second = w.engine.issue_loc(&w.bank, po, file('b')).await;
    assert!(matches!(second, Err(WorkflowError::InvalidTransition(_))));
    assert_eq!(ledger(&w).len(), 2);
}

#[tokio::test]
async fn test_bol_requires_loc() {
    let w = world();
    let (po, _) = create_po(&w).await;

    let result = w.engine.upload_bol(&w.seller, po, file('c'), None).await;
    assert!(matches!(result, Err(WorkflowError::MissingPrerequisite(_))));
}

#[tokio::test]
async fn test_bol_starts_shipment() {
    let w = world();
    let (po, _) = create_po(&w).await;
    w.engine.issue_loc(&w.bank, po, file('b')).await.unwrap();

    let bol = w
        .engine
        .upload_bol(&w.seller, po, file('c'), Some("TRK123".to_string()))
        .await
        .unwrap();
    assert_eq!(bol.document.doc_type, DocType::Bol);
    assert_eq!(bol.transaction.status, TransactionStatus::InProgress);

    let po_doc = w.engine.store().read(|repo| repo.document(po)).unwrap();
    assert_eq!(po_doc.status, DocumentStatus::IssueBol);

    let entry = ledger(&w).pop().unwrap();
    assert_eq!(entry.action, LedgerAction::IssueBol);
    assert_eq!(entry.document_id, bol.document.id);
    assert_eq!(entry.extra_data["tracking_id"], serde_json::json!("TRK123"));
    assert_eq!(entry.extra_data["bol_id"], serde_json::json!(bol.document.id));
}

#[tokio::test]
async fn test_generated_tracking_id() {
    let w = world();
    let (po, _) = create_po(&w).await;
    w.engine.issue_loc(&w.bank, po, file('b')).await.unwrap();
    w.engine.upload_bol(&w.seller, po, file('c'), None).await.unwrap();

    let entry = ledger(&w).pop().unwrap();
    let tracking = entry.extra_data["tracking_id"].as_str().unwrap();
    assert!(tracking.starts_with("TRK-"));
}

#[tokio::test]
async fn test_out_of_order_actions_rejected() {
    let w = world();
    let (po, _) = create_po(&w).await;

    let ship = w.engine.ship(&w.seller, po).await;
    assert!(matches!(ship, Err(WorkflowError::InvalidTransition(_))));

    let receive = w.engine.receive(&w.buyer, po).await;
    assert!(matches!(receive, Err(WorkflowError::InvalidTransition(_))));

    let invoice = w.engine.issue_invoice(&w.seller, po, file('d')).await;
    assert!(matches!(invoice, Err(WorkflowError::InvalidTransition(_))));

    assert_eq!(ledger(&w).len(), 1);
}

#[tokio::test]
async fn test_full_lifecycle_and_duplicate_pay() {
    let w = world();
    let (po, txn) = received(&w).await;

    let invoice = w.engine.issue_invoice(&w.seller, po, file('d')).await.unwrap();
    assert_eq!(invoice.transaction.status, TransactionStatus::InProgress);

    let paid = w.engine.pay_invoice(&w.bank, invoice.document.id).await.unwrap();
    assert_eq!(paid.transaction.status, TransactionStatus::Completed);
    assert_eq!(paid.document.status, DocumentStatus::Pay);

    let po_doc = w.engine.store().read(|repo| repo.document(po)).unwrap();
    assert_eq!(po_doc.status, DocumentStatus::Pay);

    let before = ledger(&w).len();
    let again = w.engine.pay_invoice(&w.bank, invoice.document.id).await;
    assert!(matches!(again, Err(WorkflowError::InvalidTransition(_))));
    assert_eq!(ledger(&w).len(), before);

    let entries = ledger(&w);
    let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            LedgerAction::CreatePo,
            LedgerAction::IssueLoc,
            LedgerAction::IssueBol,
            LedgerAction::Ship,
            LedgerAction::Receive,
            LedgerAction::IssueInvoice,
            LedgerAction::Pay,
        ]
    );
    assert!(entries.iter().all(|e| e.transaction_id == txn));
    assert!(verify_chain(&entries).is_ok());
}

#[tokio::test]
async fn test_pay_through_purchase_order() {
    let w = world();
    let (po, _) = received(&w).await;

    let early = w.engine.pay_invoice(&w.bank, po).await;
    assert!(matches!(early, Err(WorkflowError::MissingPrerequisite(_))));

    let invoice = w.engine.issue_invoice(&w.seller, po, file('d')).await.unwrap();
    let paid = w.engine.pay_invoice(&w.bank, po).await.unwrap();
    assert_eq!(paid.transaction.status, TransactionStatus::Completed);

    let invoice = w
        .engine
        .store()
        .read(|repo| repo.document(invoice.document.id))
        .unwrap();
    assert_eq!(invoice.status, DocumentStatus::Pay);
}

#[tokio::test]
async fn test_invoice_pay_waits_for_receipt() {
    let w = world();
    let (po, _) = create_po(&w).await;
    w.engine.issue_loc(&w.bank, po, file('b')).await.unwrap();
    w.engine.upload_bol(&w.seller, po, file('c'), None).await.unwrap();
    w.engine.ship(&w.seller, po).await.unwrap();

    let invoice = w.engine.issue_invoice(&w.seller, po, file('d')).await.unwrap();
    let result = w.engine.pay_invoice(&w.bank, invoice.document.id).await;
    assert!(matches!(result, Err(WorkflowError::MissingPrerequisite(_))));

    let second_invoice = w.engine.issue_invoice(&w.seller, po, file('e')).await;
    assert!(matches!(second_invoice, Err(WorkflowError::InvalidTransition(_))));
}

#[tokio::test]
async fn test_roles_are_enforced() {
    let w = world();
    let (po, _) = create_po(&w).await;

    let by_seller = w.engine.issue_loc(&w.seller, po, file('b')).await;
    assert!(matches!(by_seller, Err(WorkflowError::Unauthorized(_))));

    let by_auditor = w.engine.issue_loc(&w.auditor, po, file('b')).await;
    assert!(matches!(by_auditor, Err(WorkflowError::Unauthorized(_))));

    w.engine.issue_loc(&w.bank, po, file('b')).await.unwrap();
    w.engine.upload_bol(&w.seller, po, file('c'), None).await.unwrap();

    let ship_by_buyer = w.engine.ship(&w.buyer, po).await;
    assert!(matches!(ship_by_buyer, Err(WorkflowError::Unauthorized(_))));
}

#[tokio::test]
async fn test_only_parties_act() {
    let w = world();
    let (po, _) = create_po(&w).await;
    w.engine.issue_loc(&w.bank, po, file('b')).await.unwrap();

    let stranger = register(w.engine.store(), "Eve", Role::Seller, "Initech");
    let result = w.engine.upload_bol(&stranger, po, file('c'), None).await;
    assert!(matches!(result, Err(WorkflowError::Unauthorized(_))));
}

#[tokio::test]
async fn test_claimed_identity_is_rechecked() {
    let w = world();
    let (po, _) = create_po(&w).await;

    let forged = Actor::new(w.seller.user_id, Role::Bank, w.seller.org.clone());
    let result = w.engine.issue_loc(&forged, po, file('b')).await;
    assert!(matches!(result, Err(WorkflowError::Unauthorized(_))));

    let wrong_org = Actor::new(w.bank.user_id, Role::Bank, "Other Bank");
    let result = w.engine.issue_loc(&wrong_org, po, file('b')).await;
    assert!(matches!(result, Err(WorkflowError::Unauthorized(_))));

    let ghost = Actor::new(404, Role::Bank, "First Bank");
    let result = w.engine.issue_loc(&ghost, po, file('b')).await;
    assert!(matches!(result, Err(WorkflowError::Unauthorized(_))));
}

#[tokio::test]
async fn test_unknown_document() {
    let w = world();
    let result = w.engine.ship(&w.seller, 77).await;
    assert!(matches!(result, Err(WorkflowError::NotFound { entity: "document", id: 77 })));
}

#[tokio::test]
async fn test_auditor_verify() {
    let w = world();
    let (po, _) = create_po(&w).await;

    let applied = w.engine.verify_document(&w.auditor, po).await.unwrap();
    assert!(applied.document.is_verified);
    assert!(!applied.created);
    assert_eq!(applied.document.status, DocumentStatus::Created);
    assert_eq!(ledger(&w).pop().unwrap().action, LedgerAction::Verify);

    let again = w.engine.verify_document(&w.auditor, po).await;
    assert!(matches!(again, Err(WorkflowError::InvalidTransition(_))));

    let by_bank = w.engine.verify_document(&w.bank, po).await;
    assert!(matches!(by_bank, Err(WorkflowError::Unauthorized(_))));
}

#[tokio::test]
async fn test_compromised_document_blocks_workflow() {
    let w = world();
    let (po, _) = create_po(&w).await;
    w.engine.issue_loc(&w.bank, po, file('b')).await.unwrap();
    w.engine.upload_bol(&w.seller, po, file('c'), None).await.unwrap();

    w.engine.store().read(|repo| repo.mark_compromised(po)).unwrap();

    let ship = w.engine.ship(&w.seller, po).await;
    assert!(matches!(ship, Err(WorkflowError::InvalidTransition(_))));

    let verify = w.engine.verify_document(&w.auditor, po).await;
    assert!(matches!(verify, Err(WorkflowError::InvalidTransition(_))));
}

#[tokio::test]
async fn test_compromised_sibling_blocks_payment() {
    let w = world();
    let (po, txn) = received(&w).await;
    let invoice = w.engine.issue_invoice(&w.seller, po, file('d')).await.unwrap();

    let bol = w
        .engine
        .store()
        .read(|repo| repo.document_of_type(txn, DocType::Bol))
        .unwrap()
        .unwrap();
    w.engine.store().read(|repo| repo.mark_compromised(bol.id)).unwrap();

    let result = w.engine.pay_invoice(&w.bank, invoice.document.id).await;
    assert!(matches!(result, Err(WorkflowError::MissingPrerequisite(_))));
}

#[tokio::test]
async fn test_disputed_transaction_is_frozen() {
    let w = world();
    let (po, txn) = received(&w).await;
    let invoice = w.engine.issue_invoice(&w.seller, po, file('d')).await.unwrap();

    w.engine
        .store()
        .read(|repo| repo.set_transaction_status(txn, TransactionStatus::Disputed))
        .unwrap();

    let result = w.engine.pay_invoice(&w.bank, invoice.document.id).await;
    assert!(matches!(result, Err(WorkflowError::InvalidTransition(_))));
}

#[tokio::test]
async fn test_audit_before_payment_policy() {
    let w = world_with(WorkflowPolicy::audited());
    let (po, txn) = received(&w).await;
    let invoice = w.engine.issue_invoice(&w.seller, po, file('d')).await.unwrap();

    let result = w.engine.pay_invoice(&w.bank, invoice.document.id).await;
    assert!(matches!(result, Err(WorkflowError::MissingPrerequisite(_))));

    let documents = w.engine.store().read(|repo| repo.documents_in(txn)).unwrap();
    for doc in documents {
        w.engine.verify_document(&w.auditor, doc.id).await.unwrap();
    }

    let paid = w.engine.pay_invoice(&w.bank, invoice.document.id).await.unwrap();
    assert_eq!(paid.transaction.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn test_replace_file() {
    let w = world();
    let (po, txn) = create_po(&w).await;
    let loc = w.engine.issue_loc(&w.bank, po, file('b')).await.unwrap();
    let loc_id = loc.document.id;

    let clean = w.engine.replace_file(&w.bank, loc_id, file('e')).await;
    assert!(matches!(clean, Err(WorkflowError::InvalidTransition(_))));

    w.engine.store().read(|repo| repo.mark_verified(loc_id)).unwrap();
    w.engine.store().read(|repo| repo.mark_compromised(loc_id)).unwrap();
    w.engine
        .store()
        .read(|repo| repo.set_transaction_status(txn, TransactionStatus::Disputed))
        .unwrap();

    let not_owner = w.engine.replace_file(&w.seller, loc_id, file('e')).await;
    assert!(matches!(not_owner, Err(WorkflowError::Unauthorized(_))));

    let applied = w.engine.replace_file(&w.bank, loc_id, file('e')).await.unwrap();
    assert!(!applied.document.is_compromised);
    assert!(!applied.document.is_verified);
    assert_eq!(applied.document.file_hash, "e".repeat(64));
    assert_eq!(applied.transaction.status, TransactionStatus::Disputed);

    let entry = ledger(&w).pop().unwrap();
    assert_eq!(entry.action, LedgerAction::Reupload);
    assert_eq!(entry.extra_data["old_hash"], serde_json::json!("b".repeat(64)));
}

#[tokio::test]
async fn test_concurrent_loc_issued_once() {
    let w = world();
    let (po, txn) = create_po(&w).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let engine = w.engine.clone();
        let bank = w.bank.clone();
        tasks.push(tokio::spawn(async move {
            engine.issue_loc(&bank, po, file('b')).await
        }));
    }

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(err) => assert!(matches!(err, WorkflowError::InvalidTransition(_))),
        }
    }
    assert_eq!(accepted, 1);

    let locs = w
        .engine
        .store()
        .read(|repo| repo.documents_in(txn))
        .unwrap()
        .into_iter()
        .filter(|d| d.doc_type == DocType::Loc)
        .count();
    assert_eq!(locs, 1);
    assert_eq!(ledger(&w).len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pay_settles_once() {
    let w = world();
    let (po, _) = received(&w).await;
    let invoice = w.engine.issue_invoice(&w.seller, po, file('d')).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..6 {
        let engine = w.engine.clone();
        let bank = w.bank.clone();
        // Alternate between the two payment routes
        let target = if i % 2 == 0 { invoice.document.id } else { po };
        tasks.push(tokio::spawn(async move { engine.pay_invoice(&bank, target).await }));
    }

    let mut accepted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(err) => assert!(matches!(err, WorkflowError::InvalidTransition(_))),
        }
    }
    assert_eq!(accepted, 1);

    let pays = ledger(&w)
        .into_iter()
        .filter(|e| e.action == LedgerAction::Pay)
        .count();
    assert_eq!(pays, 1);
}

#[tokio::test]
async fn test_failed_ledger_append_rolls_back() {
    let w = world();
    let (po, _) = create_po(&w).await;
    w.engine.issue_loc(&w.bank, po, file('b')).await.unwrap();

    w.engine
        .store()
        .execute_batch(
            "CREATE TRIGGER fail_ledger BEFORE INSERT ON ledger_entries
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();

    let result = w.engine.upload_bol(&w.seller, po, file('c'), None).await;
    assert!(matches!(result, Err(WorkflowError::Persistence(_))));

    w.engine.store().execute_batch("DROP TRIGGER fail_ledger;").unwrap();

    let (po_doc, documents) = w
        .engine
        .store()
        .read(|repo| {
            let po_doc = repo.document(po)?;
            let documents = repo.documents_in(po_doc.transaction_id)?;
            Ok((po_doc, documents))
        })
        .unwrap();
    assert_eq!(po_doc.status, DocumentStatus::Created);
    assert!(documents.iter().all(|d| d.doc_type != DocType::Bol));
    assert_eq!(ledger(&w).len(), 2);

    // Nothing half-written blocks the retry
    w.engine.upload_bol(&w.seller, po, file('c'), None).await.unwrap();
}

#[tokio::test]
async fn test_caller_extra_data_cannot_override_engine_keys() {
    let w = world();
    let (po, _) = create_po(&w).await;

    let request = ActionRequest::on(Action::IssueLoc, po)
        .with_upload(file('b'))
        .with_extra("po_id", 9999)
        .with_extra("reference", "LC-2024-17");
    w.engine.apply(&w.bank, request).await.unwrap();

    let entry = ledger(&w).pop().unwrap();
    assert_eq!(entry.extra_data["po_id"], serde_json::json!(po));
    assert_eq!(entry.extra_data["reference"], serde_json::json!("LC-2024-17"));
}

#[tokio::test]
async fn test_apply_rejects_malformed_requests() {
    let w = world();
    let (po, _) = create_po(&w).await;

    let no_file = w.engine.apply(&w.bank, ActionRequest::on(Action::IssueLoc, po)).await;
    assert!(matches!(no_file, Err(WorkflowError::InvalidRequest(_))));

    let order = Target::NewOrder(terms(&w.seller, "5"));
    let wrong_target = w.engine.apply(&w.seller, ActionRequest::new(Action::Ship, order)).await;
    assert!(matches!(wrong_target, Err(WorkflowError::InvalidRequest(_))));
}
