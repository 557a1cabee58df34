#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate eeprom_93lc46;
use eeprom_93lc46::*;

use std::process::exit;
use std::time::Duration;

use eeprom_93lc46::gpio::{
	MappedRegister,
	PinMap,
};
use eeprom_93lc46::serial::{
	ADDRESS_LIMIT,
	CLOCK_EDGE,
};
use eeprom_93lc46::sim::SimulatedEeprom;

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_number(matches: &clap::ArgMatches, name: &str) -> AResult<Option<u32>> {
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => return Ok(None),
	};
	parse_number(param).map(Some).map_err(|e| {
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_word(matches: &clap::ArgMatches, name: &str) -> AResult<Option<u16>> {
	match get_number(matches, name)? {
		None => Ok(None),
		Some(word) => {
			ensure!(word <= 0xffff, "parameter {} doesn't fit into 16 bits: 0x{:x}", name, word);
			Ok(Some(word as u16))
		},
	}
}

fn get_required_word(matches: &clap::ArgMatches, name: &str) -> AResult<u16> {
	get_word(matches, name)?.ok_or_else(|| format_err!("missing parameter {}", name))
}

fn pin_mask(matches: &clap::ArgMatches, name: &str, default_bit: u32) -> AResult<u8> {
	let bit = get_number(matches, name)?.unwrap_or(default_bit);
	ensure!(bit < 8, "invalid parameter {}: needs a bit number 0..7, got {}", name, bit);
	Ok(1u8 << bit)
}

fn pin_map(matches: &clap::ArgMatches) -> AResult<PinMap> {
	let defaults = PinMap::default();
	Ok(PinMap {
		offset: get_number(matches, "offset")?.map_or(defaults.offset, |offset| offset as usize),
		clock: pin_mask(matches, "clock_bit", defaults.clock.trailing_zeros())?,
		chip_select: pin_mask(matches, "cs_bit", defaults.chip_select.trailing_zeros())?,
		data_in: pin_mask(matches, "di_bit", defaults.data_in.trailing_zeros())?,
		data_out: pin_mask(matches, "do_bit", defaults.data_out.trailing_zeros())?,
	})
}

fn ready_polling(matches: &clap::ArgMatches) -> AResult<ReadyPolling> {
	let mut polling = ReadyPolling::default();
	if let Some(max_polls) = get_number(matches, "max_polls")? {
		polling.max_polls = max_polls;
	}
	if let Some(timeout_ms) = get_number(matches, "timeout_ms")? {
		polling.timeout = Some(Duration::from_millis(timeout_ms.into()));
	}
	Ok(polling)
}

fn run_self_test<H: Hardware>(ee: &mut Eeprom<H>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let mut seed = get_word(sub_m, "seed")?.unwrap_or(0);
	let rounds = get_number(sub_m, "rounds")?.unwrap_or(1);

	let mut failed_rounds = 0u32;
	for round in 0..rounds {
		let mismatches = self_test::run(ee, seed)?;
		for m in &mismatches {
			println!("@{}  W={:04x}  R={:04x}", m.address, m.written, m.read);
		}
		if mismatches.is_empty() {
			info!("Round {}: all {} words verified (seed {:04x})", round, ADDRESS_LIMIT, seed);
		} else {
			error!("Round {}: {} words failed to verify (seed {:04x})", round, mismatches.len(), seed);
			failed_rounds += 1;
		}
		seed = seed.wrapping_add(ADDRESS_LIMIT as u16);
	}

	ensure!(0 == failed_rounds, "self test failed in {} of {} rounds", failed_rounds, rounds);
	Ok(())
}

fn run<H: Hardware>(ee: &mut Eeprom<H>, matches: &clap::ArgMatches) -> AResult<()> {
	match matches.subcommand() {
		("read", Some(sub_m)) => {
			let address: Address = get_param(sub_m, "ADDRESS")?;
			println!("@{}: {:04x}", address, ee.read(address));
		},
		("write", Some(sub_m)) => {
			let address: Address = get_param(sub_m, "ADDRESS")?;
			let word = get_required_word(sub_m, "WORD")?;
			ee.write(address, word)?;
			info!("Wrote {:04x} @{}", word, address);
		},
		("dump", Some(sub_m)) => {
			let words = if sub_m.is_present("sequential") {
				info!("Using sequential READ (not verified on hardware)");
				let mut words = [0u16; ADDRESS_LIMIT];
				ee.read_many(Address::truncate(0), &mut words);
				words
			} else {
				ee.read_all()
			};
			for (address, word) in Address::all().zip(words.iter()) {
				println!("@{}: {:04x}", address, word);
			}
		},
		("erase", Some(sub_m)) => {
			let address: Address = get_param(sub_m, "ADDRESS")?;
			ee.erase(address)?;
			info!("Erased @{}", address);
		},
		("erase_all", _) => {
			ee.erase_all()?;
			info!("Erased all words");
		},
		("write_all", Some(sub_m)) => {
			let word = get_required_word(sub_m, "WORD")?;
			ee.write_all(word)?;
			info!("Wrote {:04x} to all words", word);
		},
		("ready", _) => {
			println!("{}", if ee.check_ready() { "ready" } else { "busy" });
		},
		("test", Some(sub_m)) => {
			run_self_test(ee, sub_m)?;
		},
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}

	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg sim: --sim "use a simulated EEPROM (contents are lost on exit)")
		(@arg device: -d --device +takes_value "file to map the control register from (PCI resource, /dev/gpiomem, ...)")
		(@arg offset: --offset +takes_value "byte offset of the control register in the mapped file [default: 3]")
		(@arg clock_bit: --("clock-bit") +takes_value "register bit driving CLK [default: 0]")
		(@arg cs_bit: --("cs-bit") +takes_value "register bit driving CS [default: 1]")
		(@arg di_bit: --("di-bit") +takes_value "register bit driving DI (data to the EEPROM) [default: 2]")
		(@arg do_bit: --("do-bit") +takes_value "register bit reading DO (data from the EEPROM) [default: 3]")
		(@arg delay_ns: --("delay-ns") +takes_value "settle time after each line change in ns [default: 250]")
		(@arg max_polls: --("max-polls") +takes_value "clock cycles to wait for READY after programming [default: 40000]")
		(@arg timeout_ms: --("timeout-ms") +takes_value "also give up waiting for READY after this many ms")
		(@subcommand read =>
			(about: "read one word")
			(@arg ADDRESS: +required "word address (0..63)")
		)
		(@subcommand write =>
			(about: "write one word")
			(@arg ADDRESS: +required "word address (0..63)")
			(@arg WORD: +required "16-bit value")
		)
		(@subcommand dump =>
			(about: "read all words")
			(@arg sequential: --sequential "use a single sequential READ instead of one READ per word")
		)
		(@subcommand erase =>
			(about: "erase one word (set to ffff)")
			(@arg ADDRESS: +required "word address (0..63)")
		)
		(@subcommand erase_all =>
			(about: "erase all words")
		)
		(@subcommand write_all =>
			(about: "write the same word to all addresses")
			(@arg WORD: +required "16-bit value")
		)
		(@subcommand ready =>
			(about: "show READY/BUSY status")
		)
		(@subcommand test =>
			(about: "write test patterns to the whole EEPROM and verify them (destroys contents)")
			(@arg seed: --seed +takes_value "first value of the sequential pattern [default: 0]")
			(@arg rounds: --rounds +takes_value "number of rounds; the seed advances by 64 each round [default: 1]")
		)
	).get_matches();

	let polling = ready_polling(&matches)?;
	let edge = match get_number(&matches, "delay_ns")? {
		Some(ns) => {
			ensure!(!matches.is_present("sim"), "--delay-ns has no effect with --sim");
			Duration::from_nanos(ns.into())
		},
		None => CLOCK_EDGE,
	};

	match (matches.is_present("sim"), matches.value_of("device")) {
		(true, None) => {
			info!("Using simulated EEPROM");
			let mut ee = Eeprom::new(SimulatedEeprom::new()).with_polling(polling);
			run(&mut ee, &matches)
		},
		(false, Some(device)) => {
			let reg = MappedRegister::open(device, pin_map(&matches)?)?.with_edge_delay(edge);
			let mut ee = Eeprom::new(reg).with_polling(polling);
			let res = run(&mut ee, &matches);
			ee.release();
			res
		},
		(true, Some(_)) => bail!("--sim and --device can't be used together"),
		(false, None) => bail!("need either --sim or --device"),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
