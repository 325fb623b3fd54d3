//! Integration tests: relators over kinds, roles and phases.
//!
//! The fixture is a small commerce model:
//! - `Person` and `Car` kinds
//! - `Child` / `Adult` phases of `Person` in the `lifeStage` group
//! - `Buyer` (requires `Adult`) and `Seller` (requires `Person`) roles
//! - `Sale` relator with `buyer` and `seller` slots

use ontoset_kernel::{
    Fields, KernelError, Member, MutationParams, Runtime, SetDefinition, SetId, callback, fields,
};
use ontoset_onto::{ContextPolicy, Ontology, RelatedParts, RelatorDeclaration};

struct Commerce {
    rt: Runtime,
    onto: Ontology,
    person: SetId,
    car: SetId,
    adult: SetId,
    child: SetId,
    buyer: SetId,
    seller: SetId,
}

fn commerce() -> Commerce {
    let mut rt = Runtime::new();
    let onto = Ontology::install(&mut rt).unwrap();
    let person = onto
        .define_kind(&mut rt, SetDefinition::named("Person"), None)
        .unwrap();
    let car = onto
        .define_kind(&mut rt, SetDefinition::named("Car"), None)
        .unwrap();
    let child = onto
        .define_phase(
            &mut rt,
            SetDefinition::named("Child"),
            Some("lifeStage"),
            Some(person),
            true,
        )
        .unwrap();
    let adult = onto
        .define_phase(
            &mut rt,
            SetDefinition::named("Adult"),
            Some("lifeStage"),
            Some(person),
            false,
        )
        .unwrap();
    let buyer = onto
        .define_role(&mut rt, SetDefinition::named("Buyer"), Some(adult))
        .unwrap();
    let seller = onto
        .define_role(&mut rt, SetDefinition::named("Seller"), Some(person))
        .unwrap();
    Commerce {
        rt,
        onto,
        person,
        car,
        adult,
        child,
        buyer,
        seller,
    }
}

impl Commerce {
    fn sale(&mut self, policy: ContextPolicy) -> SetId {
        let declaration = RelatorDeclaration {
            property_id: Some("sale".to_string()),
            slots: vec![
                ("buyer".to_string(), self.buyer),
                ("seller".to_string(), self.seller),
            ],
            policy,
        };
        self.onto
            .define_relator(&mut self.rt, SetDefinition::named("Sale"), declaration, None)
            .unwrap()
    }

    fn adult_person(&mut self) -> SetId {
        let p = self.rt.instantiate(self.person, Fields::new()).unwrap().unwrap();
        assert!(self
            .onto
            .transit_to(&mut self.rt, p, self.adult, MutationParams::default())
            .unwrap()
            .success());
        p
    }
}

#[test]
fn scoped_relation_grants_roles_only_inside_the_context() {
    let mut c = commerce();
    let sale = c.sale(ContextPolicy::Scoped);
    let p1 = c.adult_person();
    let p2 = c.adult_person();

    let deal = c
        .onto
        .relate(&mut c.rt, sale, fields([("buyer", p1), ("seller", p2)]))
        .unwrap()
        .unwrap();
    assert!(!c.rt.is_a(p1, c.buyer));

    c.onto.enter_relation_context(&mut c.rt, deal).unwrap();
    assert!(c.rt.is_a(p1, c.buyer));
    assert!(c.rt.is_a(p2, c.seller));
    assert_eq!(c.rt.own_member(p1, "sale").and_then(Member::as_set), Some(deal));

    c.onto.leave_relation_context(&mut c.rt, deal).unwrap();
    assert!(!c.rt.is_a(p1, c.buyer));
    assert!(!c.rt.is_a(p2, c.seller));
    assert!(c.rt.own_member(p1, "sale").is_none());

    let inside = c
        .onto
        .under_relation(&mut c.rt, deal, |rt, parts| {
            let RelatedParts::One(pair) = &parts["buyer"] else {
                panic!("buyer slot holds one part");
            };
            Ok(rt.is_a(pair.part, pair.role))
        })
        .unwrap();
    assert!(inside);
    assert!(!c.rt.is_a(p1, c.buyer));
}

#[test]
fn always_entered_relation_grants_roles_at_creation() {
    let mut c = commerce();
    let sale = c.sale(ContextPolicy::AlwaysEntered);
    let p1 = c.adult_person();
    let p2 = c.adult_person();

    let deal = c
        .onto
        .relate(&mut c.rt, sale, fields([("buyer", p1), ("seller", p2)]))
        .unwrap()
        .unwrap();
    assert!(c.onto.is_relation_entered(deal));
    assert!(c.rt.is_a(p1, c.buyer));
    assert!(c.rt.is_a(p2, c.seller));

    // stays entered after a bracketed use
    c.onto
        .under_relation(&mut c.rt, deal, |_, _| Ok(()))
        .unwrap();
    assert!(c.rt.is_a(p1, c.buyer));
}

#[test]
fn missing_slot_is_a_constraint_violation() {
    let mut c = commerce();
    let sale = c.sale(ContextPolicy::Scoped);
    let p1 = c.adult_person();
    let err = c
        .onto
        .relate(&mut c.rt, sale, fields([("buyer", p1)]))
        .unwrap_err();
    assert_eq!(
        err,
        KernelError::ConstraintViolation("missing relation `seller`".to_string())
    );
}

#[test]
fn unsatisfiable_part_is_a_constraint_violation() {
    let mut c = commerce();
    let sale = c.sale(ContextPolicy::Scoped);
    let minor = c.rt.instantiate(c.person, Fields::new()).unwrap().unwrap();
    let beetle = c.rt.instantiate(c.car, Fields::new()).unwrap().unwrap();
    let p2 = c.adult_person();

    assert!(c.rt.is_a(minor, c.child));
    for buyer in [minor, beetle] {
        let err = c
            .onto
            .relate(&mut c.rt, sale, fields([("buyer", buyer), ("seller", p2)]))
            .unwrap_err();
        assert!(matches!(err, KernelError::ConstraintViolation(_)));
    }
}

#[test]
fn failed_relate_leaves_no_trace_on_bound_parts() {
    let mut c = commerce();
    let sale = c.sale(ContextPolicy::AlwaysEntered);
    let p1 = c.adult_person();
    let beetle = c.rt.instantiate(c.car, Fields::new()).unwrap().unwrap();

    let handlers = |rt: &Runtime, event: &str| rt.publisher(p1).unwrap().matching(event).len();
    let live_before = c.rt.live_count();
    let destruct_before = handlers(&c.rt, "afterSelfDestruct");
    let degenerate_before = handlers(&c.rt, "afterDegenerate:base");

    // buyer binds, seller fails
    let err = c
        .onto
        .relate(&mut c.rt, sale, fields([("buyer", p1), ("seller", beetle)]))
        .unwrap_err();
    assert!(matches!(err, KernelError::ConstraintViolation(_)));

    assert_eq!(c.rt.live_count(), live_before);
    assert_eq!(handlers(&c.rt, "afterSelfDestruct"), destruct_before);
    assert_eq!(handlers(&c.rt, "afterDegenerate:base"), degenerate_before);
    assert!(!c.rt.is_a(p1, c.buyer));

    // the part is still free to take part in a valid relation
    let p2 = c.adult_person();
    let deal = c
        .onto
        .relate(&mut c.rt, sale, fields([("buyer", p1), ("seller", p2)]))
        .unwrap()
        .unwrap();
    assert!(c.rt.is_a(p1, c.buyer));
    assert_eq!(c.rt.own_member(p1, "sale").and_then(Member::as_set), Some(deal));
}

#[test]
fn vetoed_role_entry_installs_no_back_reference() {
    let mut c = commerce();
    let sale = c.sale(ContextPolicy::Scoped);
    let p1 = c.adult_person();
    let p2 = c.adult_person();
    let deal = c
        .onto
        .relate(&mut c.rt, sale, fields([("buyer", p1), ("seller", p2)]))
        .unwrap()
        .unwrap();

    c.rt.on(
        p1,
        "beforeBecome",
        callback(|_, _, event| {
            event.prevent_action();
            Ok(())
        }),
    )
    .unwrap();
    c.onto.enter_relation_context(&mut c.rt, deal).unwrap();

    assert!(!c.rt.is_a(p1, c.buyer));
    assert!(c.rt.own_member(p1, "sale").is_none());
    assert!(c.rt.is_a(p2, c.seller));
    assert_eq!(c.rt.own_member(p2, "sale").and_then(Member::as_set), Some(deal));
}

#[test]
fn relator_without_property_id_is_rejected() {
    let mut c = commerce();
    let declaration = RelatorDeclaration {
        property_id: None,
        slots: vec![("seller".to_string(), c.seller)],
        policy: ContextPolicy::Scoped,
    };
    let gift = c
        .onto
        .define_relator(&mut c.rt, SetDefinition::named("Gift"), declaration, None)
        .unwrap();
    let p = c.adult_person();
    let err = c
        .onto
        .relate(&mut c.rt, gift, fields([("seller", p)]))
        .unwrap_err();
    assert!(matches!(err, KernelError::InvalidArgument(_)));
}

#[test]
fn part_self_destruct_tears_the_relation_down() {
    let mut c = commerce();
    let sale = c.sale(ContextPolicy::AlwaysEntered);
    let p1 = c.adult_person();
    let p2 = c.adult_person();
    let deal = c
        .onto
        .relate(&mut c.rt, sale, fields([("buyer", p1), ("seller", p2)]))
        .unwrap()
        .unwrap();
    let seller_role = match &c.onto.related_parts(deal).unwrap()["seller"] {
        RelatedParts::One(pair) => pair.role_instance,
        RelatedParts::Many(_) => unreachable!(),
    };

    c.rt.self_destruct(p1).unwrap();

    assert!(!c.onto.is_live_relation(deal));
    assert!(c.rt.is_destroyed(deal));
    assert!(c.rt.is_destroyed(seller_role));
    assert!(!c.rt.is_a(p2, c.seller));
    assert!(c.rt.own_member(p2, "sale").is_none());
}

#[test]
fn leaving_the_specialized_phase_tears_the_relation_down() {
    let mut c = commerce();
    let sale = c.sale(ContextPolicy::AlwaysEntered);
    let p1 = c.adult_person();
    let p2 = c.adult_person();
    let deal = c
        .onto
        .relate(&mut c.rt, sale, fields([("buyer", p1), ("seller", p2)]))
        .unwrap()
        .unwrap();

    let child = c.child;
    assert!(c
        .onto
        .transit_to(&mut c.rt, p1, child, MutationParams::default())
        .unwrap()
        .success());

    assert!(c.rt.is_destroyed(deal));
    assert!(!c.rt.is_a(p1, c.buyer));
    assert!(!c.rt.is_destroyed(p1));
    assert!(c.rt.is_a(p1, child));
}

#[test]
fn destroying_the_relator_releases_the_parts() {
    let mut c = commerce();
    let sale = c.sale(ContextPolicy::AlwaysEntered);
    let p1 = c.adult_person();
    let p2 = c.adult_person();
    let deal = c
        .onto
        .relate(&mut c.rt, sale, fields([("buyer", p1), ("seller", p2)]))
        .unwrap()
        .unwrap();

    c.rt.self_destruct(deal).unwrap();
    assert!(c.rt.is_destroyed(deal));
    assert!(!c.rt.is_a(p1, c.buyer));
    assert!(c.rt.own_member(p2, "sale").is_none());

    // parts no longer notify the dead relation
    c.rt.self_destruct(p2).unwrap();
}

#[test]
fn list_slots_grow_and_single_slots_do_not() {
    let mut c = commerce();
    let declaration = RelatorDeclaration {
        property_id: Some("auction".to_string()),
        slots: vec![
            ("seller".to_string(), c.seller),
            ("bidders".to_string(), c.buyer),
        ],
        policy: ContextPolicy::AlwaysEntered,
    };
    let auction = c
        .onto
        .define_relator(&mut c.rt, SetDefinition::named("Auction"), declaration, None)
        .unwrap();
    let host = c.adult_person();
    let first = c.adult_person();
    let second = c.adult_person();

    let lot = c
        .onto
        .relate(
            &mut c.rt,
            auction,
            Fields::from([
                ("seller".to_string(), Member::Set(host)),
                ("bidders".to_string(), Member::Sets(vec![first])),
            ]),
        )
        .unwrap()
        .unwrap();

    c.onto
        .add_relation_part(&mut c.rt, lot, "bidders", second)
        .unwrap();
    assert!(c.rt.is_a(second, c.buyer));
    match &c.onto.related_parts(lot).unwrap()["bidders"] {
        RelatedParts::Many(pairs) => assert_eq!(pairs.len(), 2),
        RelatedParts::One(_) => panic!("bidders is a list slot"),
    }

    let err = c
        .onto
        .add_relation_part(&mut c.rt, lot, "seller", second)
        .unwrap_err();
    assert!(matches!(err, KernelError::ConstraintViolation(_)));
}
