// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Contains the steps required to generate an authorization key, as
//! described in <https://core.telegram.org/mtproto/auth_key>.
//!
//! Each step takes the data produced by the previous one, plus the raw
//! bytes the server sent back in response to it, and returns the next
//! request to send alongside the data the following step will need. The
//! caller owns the socket; this module only ever sees byte buffers.
//!
//! ```no_run
//! use mtcore_proto::authentication;
//!
//! fn send_to_server(request: &[u8]) -> Vec<u8> {
//!     unimplemented!()
//! }
//!
//! let (request, data) = authentication::step1().unwrap();
//! let response = send_to_server(&request);
//!
//! let (request, data) = authentication::step2(data, &response).unwrap();
//! let response = send_to_server(&request);
//!
//! let (request, data) = authentication::step3(data, &response).unwrap();
//! let response = send_to_server(&request);
//!
//! let authentication::Finished { auth_key, .. } = authentication::create_key(data, &response).unwrap();
//! ```

use crate::errors::AuthenticationError as Error;
use getrandom::getrandom;
use mtcore_crypto::{factorize::factorize, rsa, AuthKey};
use mtcore_tl::{constructors as tl, Cursor, Deserializable, RemoteCall, Serializable};
use num_bigint::{BigUint, ToBigUint};
use sha1::{Digest, Sha1};
use web_time::{SystemTime, UNIX_EPOCH};

/// Find the RSA key's `(n, e)` pair for a known fingerprint. Seeded with
/// Telegram's hardcoded default keyring; callers cannot currently extend
/// it (see `SPEC_FULL.md` §6, "process-wide state").
fn key_for_fingerprint(fingerprint: i64) -> Option<rsa::Key> {
    Some(match fingerprint {
        // Telegram's production key, fingerprint 0x216be86c022bb4c3.
        0x216b_e86c_022b_b4c3 => rsa::Key::new(
            "24403446649145068056824081744112065346446136066297307473868293895086332508101251964919587745984311372853053253457835208829824428441874946556659953519213382748319518214765985662663680818277989736779506318868003755216402538945900388706898101286548187286716959100102939636333452457308619454821845196109544157601096359148241435922125602449263164512290854366930013825808102403072317738266383237191313714482187326643144603633877219028262697593882410403273959074350849923041765639673335775605842311578109726403165298875058941765362622936097839775380070572921007586266115476975819175319995527916042178582540628652481530373407",
            "65537",
        )
        .unwrap(),
        // Auxiliary production key.
        -3414540481677951611 => rsa::Key::new("29379598170669337022986177149456128565388431120058863768162556424047512191330847455146576344487764408661701890505066208632169112269581063774293102577308490531282748465986139880977280302242772832972539403531316010870401287642763009136156734339538042419388722777357134487746169093539093850251243897188928735903389451772730245253062963384108812842079887538976360465290946139638691491496062099570836476454855996319192747663615955633778034897140982517446405334423701359108810182097749467210509584293428076654573384828809574217079944388301239431309115013843331317877374435868468779972014486325557807783825502498215169806323", "65537").unwrap(),
        // Test DC key.
        -5595554452916591101 => rsa::Key::new("25342889448840415564971689590713473206898847759084779052582026594546022463853940585885215951168491965708222649399180603818074200620463776135424884632162512403163793083921641631564740959529419359595852941166848940585952337613333022396096584117954892216031229237302943701877588456738335398602461675225081791820393153757504952636234951323237820036543581047826906120927972487366805292115792231423684261262330394324750785450942589751755390156647751460719351439969059949569615302809050721500330239005077889855323917509948255722081644689442127297605422579707142646660768825302832201908302295573257427896031830742328565032949", "65537").unwrap(),

        _ => return None,
    })
}

/// The data generated by [`step1`], needed for [`step2`].
pub struct Step1 {
    nonce: [u8; 16],
}

/// The data generated by [`step2`], needed for [`step3`].
pub struct Step2 {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
}

/// The data generated by [`step3`], needed for [`create_key`].
pub struct Step3 {
    nonce: [u8; 16],
    server_nonce: [u8; 16],
    new_nonce: [u8; 32],
    gab: BigUint,
    time_offset: i32,
}

/// The outcome of a successful key exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Finished {
    pub auth_key: [u8; 256],
    pub time_offset: i32,
    pub first_salt: i64,
}

/// Step 1: send `req_pq_multi` with a fresh random nonce.
pub fn step1() -> Result<(Vec<u8>, Step1), Error> {
    let mut nonce = [0u8; 16];
    getrandom(&mut nonce).expect("failed to generate secure data for auth key exchange");
    do_step1(&nonce)
}

fn do_step1(nonce: &[u8; 16]) -> Result<(Vec<u8>, Step1), Error> {
    let nonce = *nonce;
    Ok((tl::ReqPqMulti { nonce }.to_bytes(), Step1 { nonce }))
}

/// Step 2: validate `resPQ`, factorize `pq`, and send `req_DH_params` with
/// the RSA-wrapped inner data.
pub fn step2(data: Step1, response: &[u8]) -> Result<(Vec<u8>, Step2), Error> {
    let mut random_bytes = [0u8; 32 + 256];
    getrandom(&mut random_bytes).expect("failed to generate secure data for auth key exchange");
    do_step2(data, response, &random_bytes)
}

fn do_step2(
    data: Step1,
    response: &[u8],
    random_bytes: &[u8; 32 + 256],
) -> Result<(Vec<u8>, Step2), Error> {
    let Step1 { nonce } = data;
    let res_pq = <tl::ReqPqMulti as RemoteCall>::Return::from_bytes(response)?;

    check_nonce(&res_pq.nonce, &nonce)?;

    if res_pq.pq.len() != 8 {
        return Err(Error::InvalidPqSize {
            size: res_pq.pq.len(),
        });
    }
    let pq = {
        let mut buffer = [0u8; 8];
        buffer.copy_from_slice(&res_pq.pq);
        u64::from_be_bytes(buffer)
    };

    let (p, q) = factorize(pq);

    let mut new_nonce = [0u8; 32];
    new_nonce.copy_from_slice(&random_bytes[..32]);
    let random_bytes: [u8; 256] = random_bytes[32..].try_into().unwrap();

    // "pq is a representation of a natural number (in binary big endian
    // format)" — Telegram rejects requests that carry extra leading zero
    // bytes, so trim them away.
    let trim = |v: &[u8]| {
        let pos = v.iter().position(|&b| b != 0).unwrap_or(v.len() - 1);
        v[pos..].to_vec()
    };
    let p_bytes = trim(&p.to_be_bytes());
    let q_bytes = trim(&q.to_be_bytes());

    let pq_inner_data = tl::PqInnerData {
        pq: res_pq.pq.clone(),
        p: p_bytes.clone(),
        q: q_bytes.clone(),
        nonce,
        server_nonce: res_pq.server_nonce,
        new_nonce,
    }
    .to_bytes();

    let fingerprint = res_pq
        .server_public_key_fingerprints
        .iter()
        .copied()
        .find(|&fp| key_for_fingerprint(fp).is_some())
        .ok_or_else(|| Error::UnknownFingerprints {
            fingerprints: res_pq.server_public_key_fingerprints.clone(),
        })?;
    let key = key_for_fingerprint(fingerprint).expect("checked above");
    let encrypted_data = rsa::encrypt_hashed(&pq_inner_data, &key, &random_bytes);

    Ok((
        tl::ReqDhParams {
            nonce,
            server_nonce: res_pq.server_nonce,
            p: p_bytes,
            q: q_bytes,
            public_key_fingerprint: fingerprint,
            encrypted_data,
        }
        .to_bytes(),
        Step2 {
            nonce,
            server_nonce: res_pq.server_nonce,
            new_nonce,
        },
    ))
}

/// Step 3: decrypt `server_DH_params_ok`, derive `g_b`/`g_ab`, and send
/// `set_client_DH_params`.
pub fn step3(data: Step2, response: &[u8]) -> Result<(Vec<u8>, Step3), Error> {
    let mut random_bytes = [0u8; 256 + 16];
    getrandom(&mut random_bytes).expect("failed to generate secure data for auth key exchange");
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is before epoch")
        .as_secs() as i32;
    do_step3(data, response, &random_bytes, now)
}

fn do_step3(
    data: Step2,
    response: &[u8],
    random_bytes: &[u8; 256 + 16],
    now: i32,
) -> Result<(Vec<u8>, Step3), Error> {
    let Step2 {
        nonce,
        server_nonce,
        new_nonce,
    } = data;

    let server_dh_params = <tl::ReqDhParams as RemoteCall>::Return::from_bytes(response)?;
    let server_dh_params = match server_dh_params {
        tl::ServerDhParams::Fail(fail) => {
            check_nonce(&fail.nonce, &nonce)?;
            check_server_nonce(&fail.server_nonce, &server_nonce)?;

            let mut hasher = Sha1::new();
            hasher.update(new_nonce);
            let sha = hasher.finalize();
            let mut expected = [0u8; 16];
            expected.copy_from_slice(&sha[4..20]);
            check_new_nonce_hash(&fail.new_nonce_hash, &expected)?;

            return Err(Error::DhParamsFail);
        }
        tl::ServerDhParams::Ok(ok) => ok,
    };

    check_nonce(&server_dh_params.nonce, &nonce)?;
    check_server_nonce(&server_dh_params.server_nonce, &server_nonce)?;

    if server_dh_params.encrypted_answer.len() % 16 != 0 {
        return Err(Error::EncryptedResponseNotPadded {
            len: server_dh_params.encrypted_answer.len(),
        });
    }

    let (key, iv) = mtcore_crypto::generate_key_data_from_nonce(&server_nonce, &new_nonce);
    let plain_text_answer =
        mtcore_crypto::decrypt_ige(&server_dh_params.encrypted_answer, &key, &iv);

    let mut got_answer_hash = [0u8; 20];
    got_answer_hash.copy_from_slice(&plain_text_answer[..20]);

    let mut cursor = Cursor::from_slice(&plain_text_answer[20..]);
    let server_dh_inner = tl::ServerDhInnerData::deserialize(&mut cursor)
        .map_err(|error| Error::InvalidDhInnerData { error })?;

    let mut hasher = Sha1::new();
    hasher.update(&plain_text_answer[20..20 + cursor.pos()]);
    let expected_answer_hash: [u8; 20] = hasher.finalize().into();
    if got_answer_hash != expected_answer_hash {
        return Err(Error::InvalidAnswerHash {
            got: got_answer_hash,
            expected: expected_answer_hash,
        });
    }

    check_nonce(&server_dh_inner.nonce, &nonce)?;
    check_server_nonce(&server_dh_inner.server_nonce, &server_nonce)?;

    let dh_prime = BigUint::from_bytes_be(&server_dh_inner.dh_prime);
    let g = server_dh_inner
        .g
        .to_biguint()
        .ok_or(Error::GParameterOutOfRange)?;
    let g_a = BigUint::from_bytes_be(&server_dh_inner.g_a);
    let time_offset = server_dh_inner.server_time - now;

    let b = BigUint::from_bytes_be(&random_bytes[..256]);
    let g_b = g.modpow(&b, &dh_prime);
    let gab = g_a.modpow(&b, &dh_prime);

    let random_bytes = {
        let mut buffer = [0u8; 16];
        buffer.copy_from_slice(&random_bytes[256..]);
        buffer
    };

    // "both sides are to check that g, g_a and g_b are greater than 1 and
    // less than dh_prime - 1 [and] between 2^{2048-64} and
    // dh_prime - 2^{2048-64}". https://core.telegram.org/mtproto/auth_key#dh-key-exchange-complete
    let one = BigUint::from(1u8);
    let in_range = |value: &BigUint, low: &BigUint, high: &BigUint| low < value && value < high;
    if !in_range(&g, &one, &(&dh_prime - &one))
        || !in_range(&g_a, &one, &(&dh_prime - &one))
        || !in_range(&g_b, &one, &(&dh_prime - &one))
    {
        return Err(Error::GParameterOutOfRange);
    }
    let safety_margin = one << (2048 - 64);
    if !in_range(&g_a, &safety_margin, &(&dh_prime - &safety_margin))
        || !in_range(&g_b, &safety_margin, &(&dh_prime - &safety_margin))
    {
        return Err(Error::GParameterOutOfRange);
    }

    let client_dh_inner = tl::ClientDhInnerData {
        nonce,
        server_nonce,
        retry_id: 0,
        g_b: g_b.to_bytes_be(),
    }
    .to_bytes();

    let mut hasher = Sha1::new();
    hasher.update(&client_dh_inner);
    let sha = hasher.finalize();

    let client_dh_inner_hashed = {
        let mut buffer = Vec::with_capacity(20 + client_dh_inner.len() + 16);
        buffer.extend(&sha);
        buffer.extend(&client_dh_inner);
        // Pad ourselves so `encrypt_ige`'s own padding (which would be
        // random) never has to run.
        let pad_len = (16 - (buffer.len() % 16)) % 16;
        buffer.extend(&random_bytes[..pad_len]);
        buffer
    };

    let encrypted_data = mtcore_crypto::encrypt_ige(&client_dh_inner_hashed, &key, &iv);

    Ok((
        tl::SetClientDhParams {
            nonce,
            server_nonce,
            encrypted_data,
        }
        .to_bytes(),
        Step3 {
            nonce,
            server_nonce,
            new_nonce,
            gab,
            time_offset,
        },
    ))
}

/// Step 4: interpret `dh_gen_ok` / `dh_gen_retry` / `dh_gen_fail` and, on
/// success, derive the final [`AuthKey`] bytes and first server salt.
pub fn create_key(data: Step3, response: &[u8]) -> Result<Finished, Error> {
    let Step3 {
        nonce,
        server_nonce,
        new_nonce,
        gab,
        time_offset,
    } = data;

    let answer = <tl::SetClientDhParams as RemoteCall>::Return::from_bytes(response)?;

    struct DhGen {
        nonce: [u8; 16],
        server_nonce: [u8; 16],
        new_nonce_hash: [u8; 16],
        nonce_number: u8,
    }

    let dh_gen = match answer {
        tl::SetClientDhParamsAnswer::DhGenOk(ok) => DhGen {
            nonce: ok.nonce,
            server_nonce: ok.server_nonce,
            new_nonce_hash: ok.new_nonce_hash1,
            nonce_number: 1,
        },
        tl::SetClientDhParamsAnswer::DhGenRetry(retry) => {
            check_nonce(&retry.nonce, &nonce)?;
            check_server_nonce(&retry.server_nonce, &server_nonce)?;
            // See `SPEC_FULL.md` §9 / DESIGN.md: retry semantics are
            // underspecified upstream; surface as a terminal error rather
            // than looping.
            return Err(Error::DhGenRetry {
                new_nonce_hash2: retry.new_nonce_hash2,
            });
        }
        tl::SetClientDhParamsAnswer::DhGenFail(fail) => {
            check_nonce(&fail.nonce, &nonce)?;
            check_server_nonce(&fail.server_nonce, &server_nonce)?;
            return Err(Error::DhGenFail);
        }
    };

    check_nonce(&dh_gen.nonce, &nonce)?;
    check_server_nonce(&dh_gen.server_nonce, &server_nonce)?;

    let auth_key = {
        let mut buffer = [0u8; 256];
        let gab_bytes = gab.to_bytes_be();
        let skip = buffer.len() - gab_bytes.len();
        buffer[skip..].copy_from_slice(&gab_bytes);
        AuthKey::from_bytes(buffer)
    };

    let new_nonce_hash = auth_key.calc_new_nonce_hash(&new_nonce, dh_gen.nonce_number);
    check_new_nonce_hash(&dh_gen.new_nonce_hash, &new_nonce_hash)?;

    let first_salt = {
        let mut buffer = [0u8; 8];
        buffer
            .iter_mut()
            .zip(&new_nonce[..8])
            .zip(&server_nonce[..8])
            .for_each(|((x, a), b)| *x = a ^ b);
        i64::from_le_bytes(buffer)
    };

    Ok(Finished {
        auth_key: auth_key.to_bytes(),
        time_offset,
        first_salt,
    })
}

fn check_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::InvalidNonce {
            got: *got,
            expected: *expected,
        })
    }
}

fn check_server_nonce(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::InvalidServerNonce {
            got: *got,
            expected: *expected,
        })
    }
}

fn check_new_nonce_hash(got: &[u8; 16], expected: &[u8; 16]) -> Result<(), Error> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::InvalidNewNonceHash {
            got: *got,
            expected: *expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_res_pq(nonce: [u8; 16], server_nonce: [u8; 16], pq: &[u8], fingerprints: &[i64]) -> Vec<u8> {
        let mut buf = Vec::new();
        0x0516_2463u32.serialize(&mut buf);
        nonce.serialize(&mut buf);
        server_nonce.serialize(&mut buf);
        pq.to_vec().serialize(&mut buf);
        fingerprints.to_vec().serialize(&mut buf);
        buf
    }

    #[test]
    fn canonical_key_fingerprint_matches() {
        // `SPEC_FULL.md` §8, end-to-end scenario 2.
        assert!(key_for_fingerprint(0x216be86c022bb4c3u64 as i64).is_some());
    }

    #[test]
    fn step1_echoes_nonce_and_constructor() {
        let nonce = [7u8; 16];
        let (request, data) = do_step1(&nonce).unwrap();
        assert_eq!(&request[0..4], &0xbe7e_8ef1u32.to_le_bytes());
        assert_eq!(&request[4..20], &nonce);
        assert_eq!(data.nonce, nonce);
    }

    #[test]
    fn step2_rejects_mismatched_nonce() {
        let (_, data) = do_step1(&[1u8; 16]).unwrap();
        let response = build_res_pq([2u8; 16], [3u8; 16], &3118979781119966969u64.to_be_bytes(), &[]);
        let random_bytes = [0u8; 32 + 256];
        let err = do_step2(data, &response, &random_bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidNonce { .. }));
    }

    #[test]
    fn step2_rejects_unknown_fingerprints() {
        let nonce = [1u8; 16];
        let (_, data) = do_step1(&nonce).unwrap();
        let response = build_res_pq(nonce, [3u8; 16], &3118979781119966969u64.to_be_bytes(), &[123]);
        let random_bytes = [0u8; 32 + 256];
        let err = do_step2(data, &response, &random_bytes).unwrap_err();
        assert!(matches!(err, Error::UnknownFingerprints { .. }));
    }

    #[test]
    fn step2_builds_req_dh_params_for_known_fingerprint() {
        // `SPEC_FULL.md` §8, factorization scenario.
        let pq = 3118979781119966969u64;
        let (p, q) = factorize(pq);
        assert_eq!((p, q), (1719614201, 1813767169));

        let nonce = [1u8; 16];
        let (_, data) = do_step1(&nonce).unwrap();
        let response = build_res_pq(
            nonce,
            [3u8; 16],
            &pq.to_be_bytes(),
            &[0x216be86c022bb4c3u64 as i64],
        );
        let mut random_bytes = [0u8; 32 + 256];
        getrandom(&mut random_bytes).unwrap();
        let (request, next) = do_step2(data, &response, &random_bytes).unwrap();
        assert_eq!(&request[0..4], &0xd712_e4be_u32.to_le_bytes());
        assert_eq!(next.nonce, nonce);
    }

    #[test]
    fn nonce_helpers_reject_mismatches() {
        assert!(check_nonce(&[1; 16], &[2; 16]).is_err());
        assert!(check_server_nonce(&[1; 16], &[2; 16]).is_err());
        assert!(check_new_nonce_hash(&[1; 16], &[2; 16]).is_err());
        assert!(check_nonce(&[5; 16], &[5; 16]).is_ok());
    }
}
