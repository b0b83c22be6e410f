//! ELM-327-style ASCII adapter response handling.

use nom::IResult;
use nom::bytes::complete::take_while1;
use nom::character::is_hex_digit;
use nom::combinator::map;
use nom::multi::many0;
use nom::branch::alt;

/// One token of a raw adapter response: either a run of hex digits to
/// keep, or a single byte of adapter chatter (prompt, echo punctuation,
/// banner text, CR/LF) to drop.
enum Token<'a> {
    Hex(&'a [u8]),
    Dropped,
}

fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        map(take_while1(is_hex_digit), Token::Hex),
        map(nom::bytes::complete::take(1usize), |_| Token::Dropped),
    ))(input)
}

fn hex_digits(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (input, tokens) = many0(token)(input)?;
    let digits = tokens
        .into_iter()
        .filter_map(|t| match t {
            Token::Hex(bytes) => Some(bytes),
            Token::Dropped => None,
        })
        .collect::<Vec<_>>()
        .concat();
    Ok((input, digits))
}

/// Strip ELM-327 echo/prompt noise from a raw adapter response and decode
/// the remaining hex digits. Falls back to the raw bytes unchanged if what
/// remains isn't valid hex (an odd digit count is handled by dropping the
/// trailing nibble, matching the original adapter's tolerance).
pub fn strip_elm_echo(resp: &[u8]) -> Vec<u8> {
    let Ok((_, mut digits)) = hex_digits(resp) else {
        return resp.to_vec();
    };
    if digits.len() % 2 == 1 {
        digits.pop();
    }
    if digits.is_empty() {
        return resp.to_vec();
    }
    let text = match std::str::from_utf8(&digits) {
        Ok(t) => t,
        Err(_) => return resp.to_vec(),
    };
    hex::decode(text).unwrap_or_else(|_| resp.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prompt_and_whitespace() {
        let resp = b"41 00 BE 1F A8 13\r\r>";
        assert_eq!(strip_elm_echo(resp), vec![0x41, 0x00, 0xBE, 0x1F, 0xA8, 0x13]);
    }

    #[test]
    fn searching_banner_hex_letters_leak_into_the_stream() {
        // the "SEARCHING..." banner isn't special-cased: its E/A/C letters
        // are valid hex digits and survive alongside the real response,
        // same as the plain non-hex-character strip the original does.
        let resp = b"SEARCHING...\r43 01 23 00 00\r\r>";
        assert_eq!(
            strip_elm_echo(resp),
            vec![0xEA, 0xC4, 0x30, 0x12, 0x30, 0x00]
        );
    }

    #[test]
    fn drops_odd_trailing_nibble() {
        let resp = b"41005";
        assert_eq!(strip_elm_echo(resp), vec![0x41, 0x00]);
    }

    #[test]
    fn falls_back_to_raw_when_no_hex() {
        let resp = b"????";
        assert_eq!(strip_elm_echo(resp), resp.to_vec());
    }
}
