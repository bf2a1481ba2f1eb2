use rand::Rng;

use super::*;

#[test]
fn test_insert_delete() {
    let mut idl = Idl::empty();
    for id in [5, 1, 3, 1, 9] {
        idl.insert(id);
    }
    assert_eq!(idl.len(), 4);
    assert!(idl.contains(1));
    assert!(idl.contains(9));
    assert!(!idl.contains(2));

    idl.delete(1);
    assert!(!idl.contains(1));
    assert_eq!(idl.len(), 3);
}

#[test]
fn test_union_intersect_exact() {
    let a = Idl::from_sorted(&[1, 2, 3, 10]);
    let b = Idl::from_sorted(&[2, 3, 4]);

    let u = a.union(&b);
    assert_eq!(sorted(&u), vec![1, 2, 3, 4, 10]);

    let i = a.intersect(&b);
    assert_eq!(sorted(&i), vec![2, 3]);

    let d = a.difference(&b);
    assert_eq!(sorted(&d), vec![1, 10]);
}

#[test]
fn test_union_commutative_associative() {
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let a = random_idl(&mut rng, 50);
        let b = random_idl(&mut rng, 50);
        let c = random_idl(&mut rng, 50);

        assert_eq!(sorted(&a.union(&b)), sorted(&b.union(&a)));
        assert_eq!(
            sorted(&a.union(&b).union(&c)),
            sorted(&a.union(&b.union(&c)))
        );
    }
}

#[test]
fn test_intersect_matches_set_semantics() {
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let a = random_idl(&mut rng, 40);
        let b = random_idl(&mut rng, 40);

        let want: std::collections::BTreeSet<u32> =
            sorted(&a).into_iter().collect::<std::collections::BTreeSet<_>>()
                .intersection(&sorted(&b).into_iter().collect())
                .copied()
                .collect();
        let got: std::collections::BTreeSet<u32> = sorted(&a.intersect(&b)).into_iter().collect();
        assert_eq!(want, got);
    }
}

#[test]
fn test_all_is_identity_and_absorbing() {
    let x = Idl::from_sorted(&[1, 2, 3]);

    assert!(!Idl::All.intersect(&x).is_all());
    assert_eq!(sorted(&Idl::All.intersect(&x)), sorted(&x));
    assert!(x.intersect(&Idl::All).len() == x.len());

    assert!(Idl::All.union(&x).is_all());
    assert!(x.union(&Idl::All).is_all());
}

#[test]
fn test_range_promotion_on_insert() {
    let mut idl = Idl::empty();
    for id in 0..(RANGE_PROMOTE_THRESHOLD as u32 + 10) {
        idl.insert(id);
    }
    match idl {
        Idl::Range(first, last) => {
            assert_eq!(first, 0);
            assert!(last >= RANGE_PROMOTE_THRESHOLD as u32);
        }
        _ => panic!("expected promotion to range form"),
    }
}

#[test]
fn test_range_intersect_with_exact_filters_members() {
    let range = Idl::Range(10, 20);
    let exact = Idl::from_sorted(&[5, 12, 15, 25]);

    let got = range.intersect(&exact);
    assert_eq!(sorted(&got), vec![12, 15]);
}

#[test]
fn test_encode_decode_roundtrip() {
    let idl = Idl::from_sorted(&[1, 2, 3, 100]);
    let mut buf = Vec::new();
    idl.encode(&mut buf).unwrap();
    let back = Idl::decode(&buf).unwrap();
    assert_eq!(sorted(&idl), sorted(&back));
}

#[test]
fn test_encode_decode_range_roundtrip() {
    let idl = Idl::Range(7, 900);
    let mut buf = Vec::new();
    idl.encode(&mut buf).unwrap();
    match Idl::decode(&buf).unwrap() {
        Idl::Range(a, b) => {
            assert_eq!(a, 7);
            assert_eq!(b, 900);
        }
        _ => panic!("expected range form"),
    }
}

#[test]
fn test_encode_all_is_error() {
    let mut buf = Vec::new();
    assert!(Idl::All.encode(&mut buf).is_err());
}

fn sorted(idl: &Idl) -> Vec<u32> {
    let mut v: Vec<u32> = idl.iter().collect();
    v.sort_unstable();
    v
}

fn random_idl<R: Rng>(rng: &mut R, n: usize) -> Idl {
    let ids: Vec<u32> = (0..n).map(|_| rng.gen_range(0..200)).collect();
    Idl::from_sorted(&{
        let mut v = ids;
        v.sort_unstable();
        v.dedup();
        v
    })
}
