//! The deriver suggests an action exactly when the validator would accept
//! one of that action's transitions, for every (status, role, ownership).

use psc_lifecycle::{derive_action, plan, Recipient, Transition};
use psc_schemas::{Address, Batch, BatchStatus, Role, User};

fn user(address: &Address, role: Role) -> User {
    User {
        address: address.clone(),
        name: "actor".to_string(),
        role,
        is_active: true,
        registered_at: 0,
    }
}

fn accepted(t: Transition, batch: &Batch, actor: &User) -> bool {
    let rcpt_addr = Address::parse("0xrecipient").unwrap();
    let rcpt_user = t.rule().recipient.map(|r| user(&rcpt_addr, r));
    let recipient = rcpt_user.as_ref().map(|u| Recipient {
        address: &rcpt_addr,
        user: Some(u),
    });
    plan(t, batch, actor, recipient).is_ok()
}

#[test]
fn deriver_agrees_with_transition_table() {
    let owner = Address::parse("0xowner").unwrap();
    let stranger = Address::parse("0xstranger").unwrap();

    for status in BatchStatus::ALL {
        let batch = Batch {
            batch_id: "B1".to_string(),
            drug_name: "Aspirin".to_string(),
            current_owner: owner.clone(),
            status,
            created_at: 0,
            exists: true,
        };
        for role in Role::ALL {
            for who in [&owner, &stranger] {
                let actor = user(who, role);
                let derived = derive_action(&batch, role, who);
                let legal: Vec<Transition> = Transition::ALL
                    .into_iter()
                    .filter(|t| *t != Transition::CreateBatch && accepted(*t, &batch, &actor))
                    .collect();

                match derived {
                    Some(action) => {
                        assert!(
                            !legal.is_empty(),
                            "{status:?}/{role:?}/{who}: derived {action:?} but nothing is legal"
                        );
                        for t in &legal {
                            assert!(
                                action.transitions().contains(t),
                                "{status:?}/{role:?}: {t} legal but not covered by {action:?}"
                            );
                        }
                    }
                    None => assert!(
                        legal.is_empty(),
                        "{status:?}/{role:?}/{who}: {legal:?} legal but nothing derived"
                    ),
                }
            }
        }
    }
}

#[test]
fn every_non_terminal_status_has_a_next_step() {
    for status in BatchStatus::ALL {
        if status == BatchStatus::None || status.is_terminal() {
            continue;
        }
        let reachable = psc_lifecycle::RULES
            .iter()
            .any(|r| r.from == status && r.transition != Transition::CreateBatch);
        assert!(reachable, "{status:?} is a dead end");
    }
}
