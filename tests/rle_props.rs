use proptest::prelude::*;
use rosalind_polish::polish::{
    add_insert, left_shift, remove_delete, run_length_encode_alignment, AlignedPair, RleString,
};

fn dna(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(prop_oneof![Just(b'A'), Just(b'C'), Just(b'G'), Just(b'T')], 0..max_len)
}

fn rotated_right(indel: &[u8], steps: usize) -> Vec<u8> {
    let mut rotated = indel.to_vec();
    if !rotated.is_empty() {
        let len = rotated.len();
        rotated.rotate_right(steps % len);
    }
    rotated
}

proptest! {
    #[test]
    fn encoding_is_lossless(sequence in dna(64)) {
        let rle = RleString::encode(&sequence);
        prop_assert_eq!(rle.expand(), sequence.clone());
        prop_assert_eq!(rle.non_rle_len(), sequence.len());
        prop_assert_eq!(rle.repeat_counts().iter().sum::<usize>(), sequence.len());
        prop_assert!(rle.repeat_counts().iter().all(|&count| count > 0));
        prop_assert!(rle.as_bytes().windows(2).all(|pair| pair[0] != pair[1]));
    }

    #[test]
    fn coordinate_maps_agree(sequence in dna(64)) {
        let rle = RleString::encode(&sequence);
        for i in 0..rle.len() {
            prop_assert_eq!(rle.rle_position(rle.non_rle_position(i)), i);
        }
        for (j, &base) in sequence.iter().enumerate() {
            let run = rle.rle_position(j);
            prop_assert_eq!(rle.as_bytes()[run], base);
            prop_assert!(rle.non_rle_position(run) <= j);
            prop_assert!(j < rle.non_rle_position(run) + rle.repeat_count(run));
        }
    }

    #[test]
    fn identity_alignment_encodes_to_identity(sequence in dna(64)) {
        let rle = RleString::encode(&sequence);
        let pairs: Vec<AlignedPair> =
            (0..sequence.len()).map(|i| AlignedPair::new(i, i, 1.0)).collect();
        let encoded = run_length_encode_alignment(&pairs, &rle, &rle);
        prop_assert_eq!(encoded.len(), rle.len());
        for (i, pair) in encoded.iter().enumerate() {
            prop_assert_eq!((pair.x, pair.y), (i, i));
        }
    }

    #[test]
    fn shifted_insert_spells_the_same_sequence(
        reference in dna(40),
        indel in proptest::collection::vec(prop_oneof![Just(b'A'), Just(b'C'), Just(b'G'), Just(b'T')], 1..5),
        seed in any::<usize>(),
    ) {
        let start = seed % (reference.len() + 1);
        let shifted = left_shift(&reference, start, &indel);
        prop_assert!(shifted <= start);
        let moved = rotated_right(&indel, start - shifted);
        prop_assert_eq!(
            add_insert(&reference, &indel, start),
            add_insert(&reference, &moved, shifted)
        );
        if shifted > 0 {
            let before = rotated_right(&indel, start - shifted + 1);
            prop_assert_ne!(
                add_insert(&reference, &indel, start),
                add_insert(&reference, &before, shifted - 1)
            );
        }
    }

    #[test]
    fn shifted_delete_removes_an_equivalent_segment(
        reference in dna(40),
        length in 1usize..5,
        seed in any::<usize>(),
    ) {
        prop_assume!(reference.len() >= length);
        let start = seed % (reference.len() - length + 1);
        let indel = reference[start..start + length].to_vec();
        let shifted = left_shift(&reference, start, &indel);
        prop_assert!(shifted <= start);
        prop_assert_eq!(
            remove_delete(&reference, length, start),
            remove_delete(&reference, length, shifted)
        );
    }
}
