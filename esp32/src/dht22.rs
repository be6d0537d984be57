use climate_node_common::{RawReading, SensorDriver, SensorError};

/// Bit-banged DHT22 driver on a single GPIO.
pub struct DHT22 {
    pin: i32,
}

impl DHT22 {
    const MAX_DHT_DATA: usize = 5;

    pub fn new(pin: i32) -> Self {
        Self { pin }
    }

    /// Microseconds the line stayed at `state`, or `None` after `max_wait`.
    fn get_signal_level(&self, max_wait: i32, state: i32) -> Option<i32> {
        use esp_idf_svc::sys::*;

        let mut u_sec: i32 = 0;
        unsafe {
            while gpio_get_level(self.pin) == state {
                u_sec += 1;
                if u_sec > max_wait {
                    return None;
                }
                ets_delay_us(1);
            }
        }

        Some(u_sec)
    }

    fn read_frame(&self) -> Result<[u8; Self::MAX_DHT_DATA], SensorError> {
        use esp_idf_svc::sys::*;

        let mut dht_data = [0u8; Self::MAX_DHT_DATA];
        let mut byte_inx = 0;
        let mut bit_inx = 7;

        unsafe {
            gpio_set_direction(self.pin, GPIO_MODE_DEF_OUTPUT);

            // pull down for 3 ms to wake the sensor
            gpio_set_level(self.pin, 0);
            ets_delay_us(3000);

            // pull up for 25 us to ask for data
            gpio_set_level(self.pin, 1);
            ets_delay_us(25);

            gpio_set_direction(self.pin, GPIO_MODE_DEF_INPUT);
        }

        // the sensor answers with 80 us low, then 80 us high
        self.get_signal_level(85, 0).ok_or(SensorError::Timeout)?;
        self.get_signal_level(85, 1).ok_or(SensorError::Timeout)?;

        for _ in 0..40 {
            // every bit starts with >50 us low
            self.get_signal_level(56, 0).ok_or(SensorError::Timeout)?;

            // a high pulse longer than ~28 us is a 1
            let u_sec = self.get_signal_level(75, 1).ok_or(SensorError::Timeout)?;
            if u_sec > 40 {
                dht_data[byte_inx] |= 1 << bit_inx;
            }

            if bit_inx == 0 {
                bit_inx = 7;
                byte_inx += 1;
            } else {
                bit_inx -= 1;
            }
        }

        Ok(dht_data)
    }
}

/// Decodes a 5-byte frame into tenths, checking the trailing checksum byte.
fn decode_frame(frame: &[u8; 5]) -> Result<RawReading, SensorError> {
    let checksum = frame[..4]
        .iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte));
    if checksum != frame[4] {
        return Err(SensorError::Checksum);
    }

    let humidity = i16::from_be_bytes([frame[0], frame[1]]);

    // the top bit of the temperature is a sign flag, not two's complement
    let mut temperature = i16::from_be_bytes([frame[2] & 0x7F, frame[3]]);
    if frame[2] & 0x80 != 0 {
        temperature = -temperature;
    }

    Ok(RawReading::new(humidity, temperature))
}

impl SensorDriver for DHT22 {
    fn read(&mut self) -> Result<RawReading, SensorError> {
        decode_frame(&self.read_frame()?)
    }
}
