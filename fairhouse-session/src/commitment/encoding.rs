//! Standard ABI encoding of the move-outcome preimage
//! `(bytes userSecret, bytes houseSecret, address account, uint256 moveIndex)`.

use fairhouse_core::{Account, Amount};

const WORD: usize = 32;
const HEAD_WORDS: usize = 4;

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

fn length_word(len: usize) -> [u8; 32] {
    Amount::from_units(len as u128).to_word()
}

fn push_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&length_word(data.len()));
    out.extend_from_slice(data);
    out.resize(out.len() + padded_len(data.len()) - data.len(), 0);
}

pub fn encode_outcome_input(
    user_secret: &[u8],
    house_secret: &[u8],
    account: &Account,
    move_index: u64,
) -> Vec<u8> {
    let user_offset = HEAD_WORDS * WORD;
    let house_offset = user_offset + WORD + padded_len(user_secret.len());
    let total = house_offset + WORD + padded_len(house_secret.len());

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&length_word(user_offset));
    out.extend_from_slice(&length_word(house_offset));
    out.extend_from_slice(&account.to_word());
    out.extend_from_slice(&Amount::from_units(u128::from(move_index)).to_word());
    push_bytes(&mut out, user_secret);
    push_bytes(&mut out, house_secret);

    debug_assert_eq!(out.len(), total);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_value(encoded: &[u8], index: usize) -> usize {
        let word = &encoded[index * WORD..(index + 1) * WORD];
        assert!(word[..24].iter().all(|b| *b == 0));
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&word[24..]);
        u64::from_be_bytes(tail) as usize
    }

    #[test]
    fn test_head_and_tail_layout() {
        let account = Account::new([0xaa; 20]);
        let encoded = encode_outcome_input(&[0x11; 32], b"houseSeed", &account, 7);

        // 4 head words, then length + one data word for each secret.
        assert_eq!(encoded.len(), 8 * WORD);
        assert_eq!(word_value(&encoded, 0), 128);
        assert_eq!(word_value(&encoded, 1), 192);
        assert_eq!(&encoded[64..76], &[0u8; 12]);
        assert_eq!(&encoded[76..96], &[0xaa; 20]);
        assert_eq!(word_value(&encoded, 3), 7);
        assert_eq!(word_value(&encoded, 4), 32);
        assert_eq!(&encoded[160..192], &[0x11; 32]);
        assert_eq!(word_value(&encoded, 6), 9);
        assert_eq!(&encoded[224..233], b"houseSeed");
        assert!(encoded[233..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_unaligned_user_secret_shifts_house_offset() {
        let account = Account::new([0x01; 20]);
        let encoded = encode_outcome_input(&[0x22; 33], &[0x33; 2], &account, 0);

        // 33 bytes pad to 64.
        assert_eq!(word_value(&encoded, 1), 128 + 32 + 64);
        assert_eq!(encoded.len(), 128 + 32 + 64 + 32 + 32);
    }
}
