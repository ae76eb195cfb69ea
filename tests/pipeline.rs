//! End-to-end pipeline scenarios, driven the way the host scheduler
//! would drive them.

use anyhow::Result;

use iqflow::aligned::AlignedVec;
use iqflow::component::{Component, PropertyValue, Retval};
use iqflow::components::{ExpSmooth, Fft, Histogram, Psd, Stov};
use iqflow::port::{InputPort, Timestamp, channel};

/// Build a VITA-49 signal data packet (type 0, no stream ID) with
/// TSI=UTC seconds, TSF=REAL_TIME picoseconds and interleaved int16 IQ
/// samples, no trailer.
fn v49_packet(seconds: u32, picoseconds: u64, iq: &[i16]) -> Vec<u8> {
    assert_eq!(iq.len() % 2, 0);
    let mut v = vec![0u8; 4];
    v.extend_from_slice(&seconds.to_be_bytes());
    v.extend_from_slice(&picoseconds.to_be_bytes());
    for s in iq {
        v.extend_from_slice(&s.to_ne_bytes());
    }
    let words = (v.len() / 4) as u32;
    v[..4].copy_from_slice(&((1u32 << 22) | (2u32 << 20) | words).to_be_bytes());
    v
}

/// Feed a VITA-49 stream into the stream-to-vector framer: every two
/// 512-scalar packets produce one 1024-float buffer stamped with the
/// first packet's time.
#[test]
fn vita49_stream_to_vector() -> Result<()> {
    let (tx, rx) = channel();
    let (mut stov, out) = Stov::<f32>::new(rx);
    stov.set_property("output_size", PropertyValue::U32(1024))?;
    stov.set_property("transport", "vita49".into())?;
    stov.initialize()?;

    let mut expected = Vec::new();
    let mut batch = Vec::new();
    for p in 0..4u32 {
        let iq: Vec<i16> = (0..512).map(|i| (i as i16) - 256 + p as i16).collect();
        expected.push(iq.clone());
        batch.push(v49_packet(1000 + p, u64::from(p) * 100, &iq));
    }
    tx.push(batch, Timestamp::default());
    assert_eq!(stov.process()?, Retval::NoYield);

    for pair in 0..2u32 {
        let (buf, ts) = out.pop().expect("missing framed buffer");
        assert_eq!(buf.len(), 1024);
        assert_eq!(buf.as_ptr() as usize % 64, 0);
        // Timestamp of the first packet of the pair.
        assert_eq!(ts.seconds, 1000 + pair * 2);
        assert_eq!(ts.picoseconds, u64::from(pair) * 200);
        // Contents are the packets' scalars widened to float.
        for (k, &want) in expected[pair as usize * 2]
            .iter()
            .chain(&expected[pair as usize * 2 + 1])
            .enumerate()
        {
            assert_eq!(buf[k], f32::from(want), "element {k} of pair {pair}");
        }
    }
    assert!(out.pop().is_none());
    Ok(())
}

/// Run the windowed FFT and PSD over constant complex frames: the
/// shifted spectrum peaks exactly at the center bin.
#[test]
fn fft_psd_peak_at_center() -> Result<()> {
    let n = 1024usize;

    let (pkt_tx, pkt_rx) = channel();
    let (mut fft, spectra) = Fft::<f32>::new(pkt_rx);
    fft.set_property("window", "BLACKMAN_HARRIS".into())?;
    fft.set_property("fft_size", PropertyValue::U32(n as u32))?;
    fft.set_property("shift", PropertyValue::Bool(true))?;
    fft.initialize()?;

    let (mut psd, psd_out) = Psd::<f32>::new(spectra);
    psd.set_property("window", "BLACKMAN_HARRIS".into())?;
    psd.set_property("fft_size", PropertyValue::U32(n as u32))?;
    psd.set_property("sample_rate", PropertyValue::F64(1e6))?;
    psd.initialize()?;

    let (mut smooth, smooth_out) = ExpSmooth::<f32>::new(psd_out);
    smooth.set_property("alpha", PropertyValue::F64(0.5))?;
    smooth.initialize()?;

    fft.start()?;
    // 16 identical constant frames, one packet each.
    let iq = vec![2000i16; n * 2];
    for _ in 0..16 {
        pkt_tx.push(vec![v49_packet(0, 0, &iq)], Timestamp::default());
    }

    let mut frames = 0;
    while frames < 16 {
        if fft.process()? == Retval::Normal {
            frames += 1;
            assert_eq!(psd.process()?, Retval::Normal);
            assert_eq!(smooth.process()?, Retval::Normal);
        }
    }
    fft.stop()?;

    let mut last = None;
    while let Some((buf, _)) = smooth_out.pop() {
        last = Some(buf);
    }
    let psd_db = last.expect("no PSD emitted");
    assert_eq!(psd_db.len(), n);
    let peak = psd_db
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .unwrap()
        .0;
    assert_eq!(peak, n / 2);
    // Bins away from the main lobe sit well below the peak.
    assert!(psd_db[n / 2] - psd_db[n / 4] > 20.0);
    Ok(())
}

/// A second of 12-bit ADC data through the histogram produces exactly
/// one 4096-bin vector whose counts cover every I component consumed.
#[test]
fn histogram_over_one_second() -> Result<()> {
    let sample_rate = 1_000_000f32;
    let samples_per_packet = 512usize;

    let (tx, rx) = channel();
    let (mut hist, out) = Histogram::new(rx);
    hist.set_property("transport", "vita49".into())?;
    hist.set_property("byteswap", PropertyValue::Bool(true))?;
    hist.set_property("adc_bits", PropertyValue::U32(12))?;
    hist.set_property("sample_rate", PropertyValue::F32(sample_rate))?;

    // 1.1 seconds of signal in back-to-back packets.
    let packets = (1.1 * sample_rate) as usize / samples_per_packet + 1;
    let iq: Vec<i16> = (0..samples_per_packet * 2)
        .map(|i| if i % 2 == 0 { 0x0100 } else { 0x7FFF })
        .collect();
    let pkt = v49_packet(0, 0, &iq);
    hist.set_property("msg_size", PropertyValue::U32(pkt.len() as u32))?;
    hist.initialize()?;

    let mut data = Vec::with_capacity(pkt.len() * packets);
    for _ in 0..packets {
        data.extend_from_slice(&pkt);
    }
    tx.push(data, Timestamp::new(1, 0));
    assert_eq!(hist.process()?, Retval::Normal);

    let (bins, _ts) = out.pop().expect("no histogram emitted");
    assert!(out.pop().is_none(), "more than one histogram emitted");
    assert_eq!(bins.len(), 4096);
    let consumed = (packets * samples_per_packet) as u64;
    assert_eq!(bins.iter().sum::<u64>(), consumed);
    // 0x0100 byte-swapped is 0x0001, so everything lands in one bin.
    assert_eq!(bins[2048 + 1], consumed);
    Ok(())
}

/// White noise through the smoother: the output variance converges to
/// roughly alpha/(2-alpha) of the input variance.
#[test]
fn smoother_variance_convergence() -> Result<()> {
    use rand::Rng;
    let alpha = 0.1f64;
    let n = 1024usize;

    let (tx, rx) = channel();
    let (mut smooth, out) = ExpSmooth::<f32>::new(rx);
    smooth.set_property("alpha", PropertyValue::F64(alpha))?;
    smooth.initialize()?;

    let mut rng = rand::rng();
    let mut last: Option<AlignedVec<f32>> = None;
    for _ in 0..200 {
        let mut buf = AlignedVec::<f32>::with_default_alignment(n)?;
        buf.iter_mut()
            .for_each(|v| *v = rng.random_range(-1.0f32..1.0));
        tx.push(buf, Timestamp::default());
        assert_eq!(smooth.process()?, Retval::Normal);
        last = out.pop().map(|(b, _)| b);
    }
    let last = last.unwrap();
    let mean = last.iter().sum::<f32>() / n as f32;
    let var = last.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n as f32;
    let input_var = 1.0f32 / 3.0; // uniform on [-1, 1)
    let want = (alpha / (2.0 - alpha)) as f32 * input_var;
    assert!(
        (var - want).abs() / want < 0.35,
        "variance {var} not within 35% of {want}"
    );
    Ok(())
}

/// Drain helper for scheduler-style polling of a component.
fn pump<T>(c: &mut dyn Component, out: &InputPort<T>) -> Result<Vec<(T, Timestamp)>> {
    let mut got = Vec::new();
    loop {
        let rv = c.process()?;
        while let Some(item) = out.pop() {
            got.push(item);
        }
        if matches!(rv, Retval::Noop | Retval::Finish) {
            break;
        }
    }
    Ok(got)
}

/// STOV keeps its fill index across batches: a frame spanning two
/// scheduler invocations still comes out whole and correctly stamped.
#[test]
fn stov_carryover_across_batches() -> Result<()> {
    let (tx, rx) = channel();
    let (mut stov, out) = Stov::<f32>::new(rx);
    stov.set_property("output_size", PropertyValue::U32(64))?;
    stov.set_property("transport", "vita49".into())?;
    stov.initialize()?;

    let iq: Vec<i16> = (0..48).collect();
    tx.push(vec![v49_packet(1, 0, &iq)], Timestamp::default());
    assert_eq!(stov.process()?, Retval::NoYield);
    assert!(out.pop().is_none(), "frame emitted before it filled");

    let iq2: Vec<i16> = (100..116).collect();
    tx.push(vec![v49_packet(2, 0, &iq2)], Timestamp::default());
    let got = pump(&mut stov, &out)?;
    assert_eq!(got.len(), 1);
    let (buf, ts) = &got[0];
    assert_eq!(ts.seconds, 1);
    assert_eq!(buf[47], 47.0);
    assert_eq!(buf[48], 100.0);
    Ok(())
}
