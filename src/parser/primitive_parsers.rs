use nom::bytes::streaming::{tag, take, take_until};
use nom::combinator::map;
use nom::number::streaming::{
    be_f32, be_f64, be_i16, be_i32, be_i64, be_i8, be_u16, be_u32, be_u64, be_u8,
};
use nom::sequence::terminated;
use nom::{IResult, Parser};

pub fn parse_c_string(i: &[u8]) -> IResult<&[u8], &[u8]> {
    terminated(take_until("\0"), tag("\0")).parse(i)
}

pub fn parse_i8(i: &[u8]) -> IResult<&[u8], i8> {
    be_i8(i)
}

pub fn parse_i16(i: &[u8]) -> IResult<&[u8], i16> {
    be_i16(i)
}

pub fn parse_i32(i: &[u8]) -> IResult<&[u8], i32> {
    be_i32(i)
}

pub fn parse_i64(i: &[u8]) -> IResult<&[u8], i64> {
    be_i64(i)
}

pub fn parse_u8(i: &[u8]) -> IResult<&[u8], u8> {
    be_u8(i)
}

pub fn parse_u16(i: &[u8]) -> IResult<&[u8], u16> {
    be_u16(i)
}

pub fn parse_u32(i: &[u8]) -> IResult<&[u8], u32> {
    be_u32(i)
}

pub fn parse_u64(i: &[u8]) -> IResult<&[u8], u64> {
    be_u64(i)
}

pub fn parse_f32(i: &[u8]) -> IResult<&[u8], f32> {
    be_f32(i)
}

pub fn parse_f64(i: &[u8]) -> IResult<&[u8], f64> {
    be_f64(i)
}

/// Identifier of the width declared in the file header (4 or 8 bytes),
/// widened to `u64`.
pub fn parse_id(id_size: u32) -> impl Fn(&[u8]) -> IResult<&[u8], u64> {
    move |i| {
        if id_size == 4 {
            map(parse_u32, u64::from).parse(i)
        } else {
            parse_u64(i)
        }
    }
}

/// Steps over `n` bytes of payload.
pub fn skip_bytes(n: u32) -> impl Fn(&[u8]) -> IResult<&[u8], &[u8]> {
    move |i| take(n).parse(i)
}
